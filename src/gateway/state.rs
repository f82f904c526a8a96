use std::sync::Arc;

use crate::config::PresaleSettings;
use crate::presale::chain::ChainClient;
use crate::presale::ledger::LedgerStore;
use crate::presale::stats::StatsAggregator;

/// Gateway shared state, read-only
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<PresaleSettings>,
    /// Balance reads only
    pub chain: Arc<dyn ChainClient>,
    pub stats: Arc<StatsAggregator>,
}

impl AppState {
    pub fn new(
        settings: Arc<PresaleSettings>,
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        let stats = Arc::new(StatsAggregator::new(ledger, settings.clone()));
        Self {
            settings,
            chain,
            stats,
        }
    }
}
