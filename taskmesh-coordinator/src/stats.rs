//! `GetMonitoringStats` (spec §4.9): a single snapshot aggregating each
//! collaborator's own stats, rather than a bespoke metrics model.

use serde::{Deserialize, Serialize};

use taskmesh_ledger::LedgerStats;
use taskmesh_pool::PoolStats;
use taskmesh_shared::model::ProtocolMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub pool: PoolStats,
    pub protocol: ProtocolMetrics,
    pub ledger: LedgerStats,
}
