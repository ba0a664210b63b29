//! Task and progress persistence (spec C3 / §4.3): in-memory,
//! relational (PostgreSQL via `sqlx`), and cached-hybrid (`moka`) backends
//! behind one [`Ledger`] contract.

pub mod error;
mod factory;
mod filter;
mod hybrid;
mod inmemory;
mod relational;
mod traits;

pub use error::{LedgerError, LedgerResult};
pub use factory::LedgerHandle;
pub use filter::{apply_sort_and_page, SortField, SortOrder, TaskFilter};
pub use hybrid::HybridLedger;
pub use inmemory::InMemoryLedger;
pub use relational::RelationalLedger;
pub use traits::{Ledger, LedgerStats};
