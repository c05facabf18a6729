//! Report composition and output.

pub mod composer;
pub mod generator;

pub use composer::{EngineSettings, ReportEngine, ReportRequest, DEFAULT_INITIAL_SUPPLY};
pub use generator::{generate_json_report, generate_text_report, write_output};
