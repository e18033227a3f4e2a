//! Error types for strand

use std::fmt;
use thiserror::Error;

/// Low-level failures raised by the metainfo client, the encryption layer
/// and the transfer engine. Callers see these only after normalization.
#[derive(Error, Debug)]
pub enum StrandError {
    #[error("no bucket specified")]
    NoBucket,

    #[error("no path specified")]
    NoPath,

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("missing encryption base: {0}")]
    MissingEncryptionBase(String),

    #[error("missing decryption base: {0}")]
    MissingDecryptionBase(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("random source failure: {0}")]
    Random(String),

    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("end of stream")]
    EndOfStream,

    #[error("operation canceled")]
    Canceled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", join_messages(.0))]
    Combined(Vec<StrandError>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrandError {
    /// Combine the outcomes of two independent cleanup steps.
    ///
    /// Both steps always run before this is called; a single failure is
    /// returned as-is and two failures become a `Combined` group.
    pub fn combine(first: crate::Result<()>, second: crate::Result<()>) -> crate::Result<()> {
        match (first, second) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(a), Err(b)) => Err(StrandError::Combined(vec![a, b])),
        }
    }

    /// Status code of the remote error, if this is one.
    pub fn rpc_code(&self) -> Option<StatusCode> {
        match self {
            StrandError::Rpc(rpc) => Some(rpc.code),
            _ => None,
        }
    }
}

fn join_messages(errors: &[StrandError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Status codes carried by remote metainfo errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum StatusCode {
    Unknown = 0,
    Canceled = 1,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    Internal = 13,
    Unavailable = 14,
    Unauthenticated = 16,
}

impl StatusCode {
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error returned by the remote service: a status code plus the
/// human-readable message the service attached to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RpcError {
    pub code: StatusCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PermissionDenied, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_keeps_single_failure() {
        let result = StrandError::combine(Ok(()), Err(StrandError::EndOfStream));
        assert!(matches!(result, Err(StrandError::EndOfStream)));
        assert!(StrandError::combine(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_combine_groups_two_failures() {
        let result = StrandError::combine(
            Err(StrandError::Storage("close".into())),
            Err(StrandError::Storage("release".into())),
        );
        match result {
            Err(StrandError::Combined(errors)) => {
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected combined error, got {:?}", other),
        }
    }

    #[test]
    fn test_rpc_error_displays_message_only() {
        let err = StrandError::from(RpcError::not_found("bucket not found: photos"));
        assert_eq!(err.rpc_code(), Some(StatusCode::NotFound));
        assert_eq!(err.to_string(), "rpc error: bucket not found: photos");
        assert_eq!(StatusCode::PermissionDenied.as_u64(), 7);
    }
}
