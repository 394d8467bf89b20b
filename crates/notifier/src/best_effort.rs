//! Typed wrapper for operations whose failure must not fail the caller.

use herald_common::error::AppError;

/// Result of a best-effort operation: either the value, or the error that was
/// logged and deliberately ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort<T> {
    Ok(T),
    Ignored { error: String },
}

impl<T> BestEffort<T> {
    /// Capture a result, logging the error at `warn` if there is one.
    pub fn capture(result: Result<T, AppError>, operation: &'static str) -> Self {
        match result {
            Ok(value) => BestEffort::Ok(value),
            Err(e) => {
                tracing::warn!(operation, error = %e, "Best-effort operation failed, continuing");
                BestEffort::Ignored {
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BestEffort::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            BestEffort::Ok(value) => Some(value),
            BestEffort::Ignored { .. } => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.ok().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_ok() {
        let result = BestEffort::capture(Ok(7u32), "count");
        assert!(result.is_ok());
        assert_eq!(result.unwrap_or(0), 7);
    }

    #[test]
    fn test_capture_error_is_ignored() {
        let result: BestEffort<u32> =
            BestEffort::capture(Err(AppError::Internal("boom".into())), "count");
        assert!(!result.is_ok());
        assert_eq!(
            result,
            BestEffort::Ignored {
                error: "Internal error: boom".to_string()
            }
        );
        assert_eq!(result.unwrap_or(0), 0);
    }
}
