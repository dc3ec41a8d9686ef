//! Transaction orchestration: binds a pager transaction, a WAL handle, and
//! the node/rel tables touched by one transaction together (spec §2
//! "Transaction orchestration").

pub mod config;
pub mod transaction;

pub use config::EngineConfig;
pub use transaction::{Transaction, TransactionParticipant};
