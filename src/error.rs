/// Error types for the cluster lifecycle driver
///
/// Infrastructure and transport failures are raised as errors. A cluster or
/// node group that the reconciler reports as failed is not an error: it is
/// reflected in the entity's status and `status_reason` instead.
use thiserror::Error;

/// Main error type for driver operations
#[derive(Debug, Error)]
pub enum Error {
    /// A resource or credential does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "KubeadmControlPlane", "ApplicationCredential")
        kind: String,
        /// Name the lookup was made with
        name: String,
    },

    /// The identity service was unreachable or rejected the request
    #[error("identity backend error: {message}")]
    AuthBackend {
        /// Description of what failed
        message: String,
        /// HTTP status returned by the backend, if any
        status: Option<u16>,
    },

    /// An observed field is absent or carries a value that cannot be interpreted
    #[error("malformed state in {object}: {message}")]
    MalformedState {
        /// Object the field was read from
        object: String,
        /// Description of what is missing or wrong
        message: String,
    },

    /// A lifecycle operation this driver does not implement
    #[error("operation '{operation}' is not supported by this driver")]
    UnsupportedOperation {
        /// Name of the operation that was invoked
        operation: &'static str,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Cluster record could not be read or written
    #[error("persistence error for {record}: {message}")]
    Persistence {
        /// Record being read or written
        record: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Invalid driver configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an identity backend error without an HTTP status
    pub fn auth_backend(msg: impl Into<String>) -> Self {
        Self::AuthBackend {
            message: msg.into(),
            status: None,
        }
    }

    /// Create an identity backend error carrying the HTTP status
    pub fn auth_backend_status(status: u16, msg: impl Into<String>) -> Self {
        Self::AuthBackend {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a malformed-state error for the given object
    pub fn malformed(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedState {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::UnsupportedOperation { operation }
    }

    /// Create a persistence error for the given record
    pub fn persistence(record: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Persistence {
            record: record.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Whether this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

/// Result type alias using the driver error
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("MachineDeployment", "abc-default-worker");
        assert_eq!(err.to_string(), "MachineDeployment abc-default-worker not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::unsupported("resize_cluster");
        assert!(err.to_string().contains("resize_cluster"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_auth_backend_keeps_status() {
        match Error::auth_backend_status(401, "invalid token") {
            Error::AuthBackend { status, .. } => assert_eq!(status, Some(401)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
