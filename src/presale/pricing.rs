//! Pricing Resolver
//!
//! Maps a deposit (in SOL) to a whole-token payout. Tiers are flat-rate
//! packages checked in listed order; anything that matches no tier falls
//! back to `floor(amount * tokens_per_sol)`.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// A fixed (price, payout) package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub price: Decimal,
    pub tokens: u64,
}

#[derive(Debug, Clone)]
pub struct PricingResolver {
    tiers: Vec<PriceTier>,
    tokens_per_sol: Decimal,
}

impl PricingResolver {
    /// Absolute tolerance when matching a deposit to a tier price (1e-9 SOL)
    pub fn tier_tolerance() -> Decimal {
        Decimal::new(1, 9)
    }

    pub fn new(tiers: Vec<PriceTier>, tokens_per_sol: Decimal) -> Self {
        Self {
            tiers,
            tokens_per_sol,
        }
    }

    pub fn tiers(&self) -> &[PriceTier] {
        &self.tiers
    }

    pub fn tokens_per_sol(&self) -> Decimal {
        self.tokens_per_sol
    }

    /// First tier whose price is within tolerance of `amount`
    pub fn matching_tier(&self, amount: Decimal) -> Option<&PriceTier> {
        let tolerance = Self::tier_tolerance();
        self.tiers
            .iter()
            .find(|tier| (amount - tier.price).abs() <= tolerance)
    }

    /// Whole tokens owed for `amount`. 0 means not eligible
    pub fn resolve(&self, amount: Decimal) -> u64 {
        if amount <= Decimal::ZERO {
            return 0;
        }
        if let Some(tier) = self.matching_tier(amount) {
            return tier.tokens;
        }
        amount
            .checked_mul(self.tokens_per_sol)
            .map(|raw| raw.floor())
            .filter(|raw| raw.is_sign_positive() && !raw.is_zero())
            .and_then(|raw| raw.to_u64())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sol(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn presale_tiers() -> PricingResolver {
        PricingResolver::new(
            vec![
                PriceTier {
                    price: sol("0.10"),
                    tokens: 5_000_000,
                },
                PriceTier {
                    price: sol("0.25"),
                    tokens: 15_000_000,
                },
                PriceTier {
                    price: sol("0.50"),
                    tokens: 35_000_000,
                },
            ],
            sol("40000000"),
        )
    }

    #[test]
    fn test_exact_tier_price_pays_fixed_amount() {
        let pricing = presale_tiers();
        assert_eq!(pricing.resolve(sol("0.10")), 5_000_000);
        assert_eq!(pricing.resolve(sol("0.25")), 15_000_000);
        assert_eq!(pricing.resolve(sol("0.5")), 35_000_000);
    }

    #[test]
    fn test_tier_match_within_tolerance() {
        let pricing = presale_tiers();
        assert_eq!(pricing.resolve(sol("0.100000001")), 5_000_000);
        assert_eq!(pricing.resolve(sol("0.099999999")), 5_000_000);
        // two lamports off is no longer a tier deposit
        assert_eq!(pricing.resolve(sol("0.100000002")), 4_000_000);
    }

    #[test]
    fn test_linear_fallback_floors() {
        let pricing = PricingResolver::new(vec![], sol("3"));
        assert_eq!(pricing.resolve(sol("1.5")), 4);
        assert_eq!(pricing.resolve(sol("0.2")), 0);
    }

    #[test]
    fn test_non_positive_input_is_not_eligible() {
        let pricing = presale_tiers();
        assert_eq!(pricing.resolve(Decimal::ZERO), 0);
        assert_eq!(pricing.resolve(sol("-0.10")), 0);
    }

    #[test]
    fn test_first_listed_tier_wins_on_overlap() {
        let pricing = PricingResolver::new(
            vec![
                PriceTier {
                    price: sol("1"),
                    tokens: 10,
                },
                PriceTier {
                    price: sol("1.000000001"),
                    tokens: 20,
                },
            ],
            Decimal::ZERO,
        );
        assert_eq!(pricing.resolve(sol("1.000000001")), 10);
    }

    #[test]
    fn test_tier_ignores_linear_rate() {
        let pricing = PricingResolver::new(
            vec![PriceTier {
                price: sol("0.10"),
                tokens: 5_000_000,
            }],
            sol("1"),
        );
        assert_eq!(pricing.resolve(sol("0.10")), 5_000_000);
    }
}
