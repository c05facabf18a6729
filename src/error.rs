//! Error taxonomy for report generation.
//!
//! Adapters translate transport and parse failures into these kinds at the
//! boundary. The composer never swallows them: a report either completes or
//! fails with one error carrying the section it came from.

use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Everything that can abort a report run.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A referenced block, council period or entity does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Caller supplied a malformed window or id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transient transport or timeout failure. Retried before surfacing.
    #[error("{source_name} unavailable: {message}")]
    UpstreamUnavailable {
        source_name: &'static str,
        message: String,
    },

    /// The upstream answered with a shape that violates its contract.
    #[error("malformed response from {source_name}: {message}")]
    MalformedResponse {
        source_name: &'static str,
        message: String,
    },

    /// Wraps a failure with the logical report section it originated from.
    #[error("{section}: {source}")]
    Section {
        section: String,
        #[source]
        source: Box<ReportError>,
    },
}

impl ReportError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ReportError::NotFound { what: what.into() }
    }

    pub fn unavailable(source_name: &'static str, message: impl Into<String>) -> Self {
        ReportError::UpstreamUnavailable {
            source_name,
            message: message.into(),
        }
    }

    pub fn malformed(source_name: &'static str, message: impl Into<String>) -> Self {
        ReportError::MalformedResponse {
            source_name,
            message: message.into(),
        }
    }

    /// The innermost error, skipping section annotations.
    pub fn root(&self) -> &ReportError {
        match self {
            ReportError::Section { source, .. } => source.root(),
            other => other,
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), ReportError::UpstreamUnavailable { .. })
    }

    /// True for failures caused by the caller's input rather than upstream state.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.root(),
            ReportError::NotFound { .. } | ReportError::InvalidArgument(_)
        )
    }

    /// Outermost section label, if any.
    pub fn section(&self) -> Option<&str> {
        match self {
            ReportError::Section { section, .. } => Some(section),
            _ => None,
        }
    }
}

/// Attach a section label to the error side of a result.
pub trait SectionExt<T> {
    fn section(self, section: impl Into<String>) -> Result<T>;
}

impl<T> SectionExt<T> for Result<T> {
    fn section(self, section: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReportError::Section {
            section: section.into(),
            source: Box::new(e),
        })
    }
}
