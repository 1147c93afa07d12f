//! LaserWatch - Machine Indicator Monitoring
//!
//! Infers laser machine operating state from camera frames of their
//! indicator lights, keeps a bounded per-machine status history, and
//! drives hysteretic email/SMS alerting. The read-only dashboard and
//! camera drivers live outside this crate; they consume the ledger file
//! and the capture contract respectively.

pub mod alert;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod ledger;
pub mod monitor;
