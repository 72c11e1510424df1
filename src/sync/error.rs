use thiserror::Error;

/// Failure taxonomy of the vendor synchronization engine.
///
/// Only `VendorUnavailable`, `VendorPayload` and `Storage` can fail a whole
/// stage. `RecordMapping` is always caught by the reconciler and folded into
/// the stage's `SyncResult`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("vendor API unavailable: {reason}")]
    VendorUnavailable { reason: String },

    #[error("vendor payload could not be parsed: {reason}")]
    VendorPayload { reason: String },

    #[error("record {vendor_id}: {reason}")]
    RecordMapping { vendor_id: String, reason: String },

    #[error("catalog storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::VendorUnavailable {
            reason: reason.into(),
        }
    }

    pub fn payload(reason: impl Into<String>) -> Self {
        Self::VendorPayload {
            reason: reason.into(),
        }
    }

    pub fn mapping(vendor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecordMapping {
            vendor_id: vendor_id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors a caller may retry later without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::VendorUnavailable { .. } | SyncError::RecordMapping { .. }
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if let Some(status) = err.status() {
            format!("HTTP {status}: {err}")
        } else {
            err.to_string()
        };
        SyncError::VendorUnavailable { reason }
    }
}

pub type SyncOutcome<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_error_names_the_record() {
        let err = SyncError::mapping("NB-100", "missing category");
        assert_eq!(err.to_string(), "record NB-100: missing category");
        assert!(err.is_recoverable());
    }

    #[test]
    fn payload_errors_are_not_recoverable() {
        assert!(!SyncError::payload("unexpected EOF").is_recoverable());
        assert!(SyncError::unavailable("connection refused").is_recoverable());
    }
}
