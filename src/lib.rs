pub mod accrual;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod request;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod watch;
pub mod workflow;

pub use error::{LeaveError, Result};
pub use service::LeaveService;
