//! council-report - network activity and treasury reports for council periods
//!
//! Combines point-in-time chain state with an event indexer to build
//! snapshot, window and council-period reports. Amounts are summed as raw
//! integers and converted to display units last.

pub mod analysis;
pub mod chain;
pub mod error;
pub mod fixture;
pub mod indexer;
pub mod models;
pub mod pool;
pub mod report;
pub mod retry;
pub mod units;

pub use error::{ReportError, Result};
pub use models::Report;
pub use report::{EngineSettings, ReportEngine, ReportRequest};
