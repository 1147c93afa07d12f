//! Machine status ledger: per-machine append-only history, flat-file
//! persistence, and windowed uptime queries.

mod models;
mod store;
mod uptime;

pub use models::*;
pub use store::*;
pub use uptime::*;
