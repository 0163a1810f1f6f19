use thiserror::Error;

/// Failure of a single backend read or write.
///
/// Cloneable because the cache hands the last error of an entry to every reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No response was received (connect failure, reset, transport timeout).
    #[error("network error on {path}: {message}")]
    Network { path: String, message: String },

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status} on {path}: {message}")]
    Http {
        path: String,
        status: u16,
        message: String,
    },

    /// The body was not the JSON we expected.
    #[error("decode error on {path}: {message}")]
    Decode { path: String, message: String },
}

impl FetchError {
    /// Status code, present only for `Http`.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn path(&self) -> &str {
        match self {
            FetchError::Network { path, .. }
            | FetchError::Http { path, .. }
            | FetchError::Decode { path, .. } => path,
        }
    }
}

/// Outcome of a rejected "run pipeline" command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// The backend refused with 409: a run is already active.
    #[error("Already running")]
    AlreadyRunning,

    /// Anything else went wrong; `reason` is for logs, not for the badge.
    #[error("Failed to start pipeline")]
    StartFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http() {
        let http = FetchError::Http {
            path: "/api/x".into(),
            status: 503,
            message: "down".into(),
        };
        let net = FetchError::Network {
            path: "/api/x".into(),
            message: "refused".into(),
        };
        assert_eq!(http.status(), Some(503));
        assert_eq!(net.status(), None);
        assert!(net.is_network());
        assert!(!http.is_network());
    }

    #[test]
    fn test_trigger_messages() {
        assert_eq!(TriggerError::AlreadyRunning.to_string(), "Already running");
        let failed = TriggerError::StartFailed {
            reason: "HTTP 500".into(),
        };
        assert_eq!(failed.to_string(), "Failed to start pipeline");
    }
}
