//! HTTP status surface: health probes and read-only ledger aggregates.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, ClickHouseStatus, LedgerStatus, StatusSource};
