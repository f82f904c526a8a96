//! Distribution Policy
//!
//! Turns a priced deposit into the final buyer and burn amounts:
//! 1. guard thresholds on the deposit size
//! 2. global cap on cumulative buyer tokens, pro-rating the deposit that crosses it
//! 3. burn split (`take` carves the burn out of the payout, `extra` burns on top)
//!
//! Only the buyer amount ever counts toward the cap.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::money::bps_of;

pub const MAX_BPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BurnMode {
    #[default]
    Off,
    Take,
    Extra,
}

impl BurnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BurnMode::Off => "off",
            BurnMode::Take => "take",
            BurnMode::Extra => "extra",
        }
    }
}

/// Deposit size limits in SOL; `None` disables a side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardConfig {
    pub min_base: Option<Decimal>,
    pub max_base: Option<Decimal>,
}

/// Why a deposit is not paid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    BelowMinimum,
    AboveMaximum,
    ZeroPayout,
    CapExhausted,
    NothingForBuyer,
}

impl Ineligible {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ineligible::BelowMinimum => "below_minimum",
            Ineligible::AboveMaximum => "above_maximum",
            Ineligible::ZeroPayout => "zero_payout",
            Ineligible::CapExhausted => "cap_exhausted",
            Ineligible::NothingForBuyer => "nothing_for_buyer",
        }
    }
}

/// Final split for an eligible deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Tokens paid to the buyer; the figure recorded and counted toward the cap
    pub buyer: u64,
    /// Tokens burned from the distributor, recorded separately
    pub burn: u64,
    /// Raw payout was clamped to the remaining cap
    pub capped: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionPolicy {
    guards: GuardConfig,
    /// 0 disables the cap
    cap: u64,
    burn_mode: BurnMode,
    burn_rate_bps: u32,
}

impl DistributionPolicy {
    pub fn new(guards: GuardConfig, cap: u64, burn_mode: BurnMode, burn_rate_bps: u32) -> Self {
        Self {
            guards,
            cap,
            burn_mode,
            burn_rate_bps: burn_rate_bps.min(MAX_BPS),
        }
    }

    pub fn guards(&self) -> GuardConfig {
        self.guards
    }

    pub fn cap(&self) -> Option<u64> {
        (self.cap > 0).then_some(self.cap)
    }

    pub fn burn_mode(&self) -> BurnMode {
        self.burn_mode
    }

    pub fn burn_rate_bps(&self) -> u32 {
        self.burn_rate_bps
    }

    /// Tokens left under the cap, `None` when uncapped
    pub fn cap_remaining(&self, cumulative_buyer: u64) -> Option<u64> {
        self.cap().map(|cap| cap.saturating_sub(cumulative_buyer))
    }

    pub fn check_guards(&self, base_amount: Decimal) -> Result<(), Ineligible> {
        if let Some(min) = self.guards.min_base
            && base_amount < min
        {
            return Err(Ineligible::BelowMinimum);
        }
        if let Some(max) = self.guards.max_base
            && base_amount > max
        {
            return Err(Ineligible::AboveMaximum);
        }
        Ok(())
    }

    /// Decide the payout for a deposit of `base_amount` priced at `raw_tokens`,
    /// given `cumulative_buyer` tokens already distributed
    pub fn evaluate(
        &self,
        base_amount: Decimal,
        raw_tokens: u64,
        cumulative_buyer: u64,
    ) -> Result<Allocation, Ineligible> {
        self.check_guards(base_amount)?;
        if raw_tokens == 0 {
            return Err(Ineligible::ZeroPayout);
        }

        let (amount, capped) = match self.cap_remaining(cumulative_buyer) {
            Some(0) => return Err(Ineligible::CapExhausted),
            Some(remaining) if raw_tokens > remaining => (remaining, true),
            _ => (raw_tokens, false),
        };

        match self.burn_mode {
            BurnMode::Off => Ok(Allocation {
                buyer: amount,
                burn: 0,
                capped,
            }),
            BurnMode::Take => {
                let burn = bps_of(amount, self.burn_rate_bps);
                let buyer = amount - burn;
                if buyer == 0 {
                    return Err(Ineligible::NothingForBuyer);
                }
                Ok(Allocation {
                    buyer,
                    burn,
                    capped,
                })
            }
            BurnMode::Extra => Ok(Allocation {
                buyer: amount,
                burn: bps_of(amount, self.burn_rate_bps),
                capped,
            }),
        }
    }
}
