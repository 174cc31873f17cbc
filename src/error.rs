use thiserror::Error;

/// Structured error context attached to batcher errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Window the failing submission belonged to, if it reached one.
    pub window_id: Option<u64>,
    /// Additional context about the error (e.g., offending value, batch size)
    pub details: Option<String>,
    /// Source of the error (e.g., "prefilter", "worker", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            window_id: None,
            details: None,
            source: None,
        }
    }

    pub fn with_window_id(mut self, id: u64) -> Self {
        self.window_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the batcher.
///
/// Errors are `Clone`: a single batch outcome is handed to every caller that
/// contributed to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The prefilter refused the parameter before it joined any batch.
    #[error("Rejected by prefilter: {message}{}", format_context(.context))]
    Rejected {
        message: String,
        context: ErrorContext,
    },

    /// The work function failed for the whole batch.
    #[error("Batch work failed: {message}{}", format_context(.context))]
    Work {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(id) = ctx.window_id {
        parts.push(format!("window: {}", id));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Prefilter rejection without extra context.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::rejected_with_context(msg, ErrorContext::new().with_source("prefilter"))
    }

    pub fn rejected_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Rejected {
            message: msg.into(),
            context,
        }
    }

    /// Work failure without extra context.
    pub fn work(msg: impl Into<String>) -> Self {
        Self::work_with_context(msg, ErrorContext::new())
    }

    pub fn work_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Work {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Error::Rejected { context, .. }
            | Error::Work { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => context,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }

    pub fn is_work_failure(&self) -> bool {
        matches!(self, Error::Work { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_context() {
        let err = Error::work_with_context("db down", ErrorContext::new());
        assert_eq!(err.to_string(), "Batch work failed: db down");
    }

    #[test]
    fn test_display_with_context() {
        let err = Error::work_with_context(
            "db down",
            ErrorContext::new()
                .with_window_id(7)
                .with_details("batch_size=3")
                .with_source("worker"),
        );
        assert_eq!(
            err.to_string(),
            "Batch work failed: db down (window: 7, details: batch_size=3, source: worker)"
        );
    }

    #[test]
    fn test_rejected_defaults_to_prefilter_source() {
        let err = Error::rejected("negative value");
        assert!(err.is_rejection());
        assert!(!err.is_work_failure());
        assert_eq!(err.context().source.as_deref(), Some("prefilter"));
    }

    #[test]
    fn test_errors_clone_equal() {
        let err = Error::work("boom");
        assert_eq!(err.clone(), err);
    }
}
