//! Analytics monitor: polls a local analytics backend and a remote
//! reference snapshot, reconciles purchase-bearing records between the
//! two, and keeps a dashboard summary of the local dataset.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod monitor;
pub mod reconcile;
pub mod stats;
pub mod utils;

pub use error::{MonitorError, Result};
