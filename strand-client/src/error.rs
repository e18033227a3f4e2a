//! Client error types
//!
//! Every failure leaving the client is normalized into [`ClientError`] by
//! [`convert_known_errors`]. The remote service reports several conditions
//! only through message text; the literals it is matched against live here.

use std::error::Error as StdError;
use std::fmt;
use strand_core::upload_id::InvalidUploadId;
use strand_core::{RpcError, StatusCode, StrandError};
use thiserror::Error;

const BANDWIDTH_LIMIT_SUFFIX: &str = "Exceeded Usage Limit";
const RATE_LIMIT_SUFFIX: &str = "Too Many Requests";
const BUCKET_NOT_FOUND_PREFIX: &str = "bucket not found";
const OBJECT_NOT_FOUND_PREFIX: &str = "object not found";

/// Which limit a resource-exhausted response hit
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    #[error("too many requests")]
    TooManyRequests,

    #[error("bandwidth limit exceeded")]
    BandwidthLimitExceeded,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("bucket name invalid ({0:?})")]
    BucketNameInvalid(String),

    #[error("object key invalid ({0:?})")]
    ObjectKeyInvalid(String),

    #[error("upload ID invalid")]
    UploadIdInvalid,

    #[error("bucket not found ({0:?})")]
    BucketNotFound(String),

    #[error("object not found ({0:?})")]
    ObjectNotFound(String),

    #[error("permission denied ({0})")]
    PermissionDenied(String),

    #[error("{0}")]
    ResourceExhausted(#[source] Exhaustion),

    /// Part upload already committed or aborted
    #[error("upload done: {0}")]
    UploadDone(&'static str),

    #[error("part number {0} should be less than max(i32)")]
    PartNumberOutOfRange(u32),

    #[error("end of stream")]
    EndOfStream,

    #[error(transparent)]
    Joined(Box<JoinedError>),

    #[error("{0}")]
    Wrapped(#[source] StrandError),
}

/// Coarse classification of a [`ClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BucketNameInvalid,
    ObjectKeyInvalid,
    UploadIdInvalid,
    BucketNotFound,
    ObjectNotFound,
    PermissionDenied,
    TooManyRequests,
    BandwidthLimitExceeded,
    UploadDone,
    PartNumberOutOfRange,
    EndOfStream,
    Canceled,
    Other,
}

impl From<InvalidUploadId> for ClientError {
    fn from(_: InvalidUploadId) -> Self {
        ClientError::UploadIdInvalid
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::BucketNameInvalid(_) => ErrorKind::BucketNameInvalid,
            ClientError::ObjectKeyInvalid(_) => ErrorKind::ObjectKeyInvalid,
            ClientError::UploadIdInvalid => ErrorKind::UploadIdInvalid,
            ClientError::BucketNotFound(_) => ErrorKind::BucketNotFound,
            ClientError::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            ClientError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ClientError::ResourceExhausted(Exhaustion::TooManyRequests) => ErrorKind::TooManyRequests,
            ClientError::ResourceExhausted(Exhaustion::BandwidthLimitExceeded) => ErrorKind::BandwidthLimitExceeded,
            ClientError::UploadDone(_) => ErrorKind::UploadDone,
            ClientError::PartNumberOutOfRange(_) => ErrorKind::PartNumberOutOfRange,
            ClientError::EndOfStream => ErrorKind::EndOfStream,
            ClientError::Joined(joined) => joined.main.kind(),
            ClientError::Wrapped(StrandError::Canceled) => ErrorKind::Canceled,
            ClientError::Wrapped(_) => ErrorKind::Other,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Status code of the remote error behind this one, if any
    pub fn rpc_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::ResourceExhausted(_) => Some(StatusCode::ResourceExhausted),
            ClientError::Joined(joined) => Some(joined.code),
            ClientError::Wrapped(err) => first_rpc_code(err),
            _ => None,
        }
    }

    pub fn is_rpc(&self, code: StatusCode) -> bool {
        self.rpc_code() == Some(code)
    }

    /// The composite error, when this is a permission failure reported by
    /// the remote service
    pub fn joined(&self) -> Option<&JoinedError> {
        match self {
            ClientError::Joined(joined) => Some(joined),
            _ => None,
        }
    }

    /// Find an error of type `E` in the cause chain. A composite error
    /// searches both of its chains.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.roots()
            .into_iter()
            .flat_map(chain)
            .find_map(|err| err.downcast_ref::<E>())
    }

    /// Whether an error equal to `target` appears in the cause chain. A
    /// composite error searches both of its chains.
    pub fn matches<E: StdError + PartialEq + 'static>(&self, target: &E) -> bool {
        self.roots()
            .into_iter()
            .flat_map(chain)
            .any(|err| err.downcast_ref::<E>() == Some(target))
    }

    fn roots(&self) -> Vec<&(dyn StdError + 'static)> {
        match self {
            ClientError::Joined(joined) => joined.ungroup().to_vec(),
            other => vec![other as &(dyn StdError + 'static)],
        }
    }
}

fn chain<'a>(start: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(start), |&err| err.source())
}

fn first_rpc_code(err: &StrandError) -> Option<StatusCode> {
    match err {
        StrandError::Combined(errors) => errors.iter().find_map(first_rpc_code),
        other => other.rpc_code(),
    }
}

/// Permission failure that keeps the original remote error alongside the
/// normalized one, so code matching either of them keeps working.
#[derive(Debug)]
pub struct JoinedError {
    main: ClientError,
    alt: StrandError,
    code: StatusCode,
}

impl JoinedError {
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// The normalized error
    pub fn main(&self) -> &ClientError {
        &self.main
    }

    /// The error as the remote service reported it
    pub fn original(&self) -> &StrandError {
        &self.alt
    }

    pub fn ungroup(&self) -> [&(dyn StdError + 'static); 2] {
        [&self.main as &(dyn StdError + 'static), &self.alt]
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.main, f)
    }
}

impl StdError for JoinedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.main)
    }
}

/// Normalize a low-level failure for an operation on `bucket`/`key`.
///
/// A combined failure is reported as its first member that maps to a known
/// error, or wrapped whole when none does.
pub fn convert_known_errors(err: StrandError, bucket: &str, key: &str) -> ClientError {
    let known = match &err {
        StrandError::Combined(errors) => errors.iter().find_map(|e| known_error(e, bucket, key)),
        other => known_error(other, bucket, key),
    };
    known.unwrap_or(ClientError::Wrapped(err))
}

fn known_error(err: &StrandError, bucket: &str, key: &str) -> Option<ClientError> {
    match err {
        StrandError::EndOfStream => Some(ClientError::EndOfStream),
        StrandError::NoBucket => Some(ClientError::BucketNameInvalid(bucket.to_string())),
        StrandError::NoPath => Some(ClientError::ObjectKeyInvalid(key.to_string())),
        StrandError::BucketNotFound(_) => Some(ClientError::BucketNotFound(bucket.to_string())),
        StrandError::ObjectNotFound(_) => Some(ClientError::ObjectNotFound(key.to_string())),
        StrandError::MissingEncryptionBase(_) | StrandError::MissingDecryptionBase(_) => {
            Some(ClientError::PermissionDenied(format!("{:?}", key)))
        }
        StrandError::Rpc(rpc) => known_rpc_error(rpc, bucket, key),
        _ => None,
    }
}

fn known_rpc_error(rpc: &RpcError, bucket: &str, key: &str) -> Option<ClientError> {
    let message = rpc.message.as_str();
    match rpc.code {
        StatusCode::ResourceExhausted => {
            if message.ends_with(BANDWIDTH_LIMIT_SUFFIX) {
                Some(ClientError::ResourceExhausted(Exhaustion::BandwidthLimitExceeded))
            } else if message.ends_with(RATE_LIMIT_SUFFIX) {
                Some(ClientError::ResourceExhausted(Exhaustion::TooManyRequests))
            } else {
                None
            }
        }
        StatusCode::NotFound => {
            if let Some(rest) = message.strip_prefix(BUCKET_NOT_FOUND_PREFIX) {
                let name = rest.strip_prefix(": ").filter(|name| !name.is_empty()).unwrap_or(bucket);
                Some(ClientError::BucketNotFound(name.to_string()))
            } else if message.starts_with(OBJECT_NOT_FOUND_PREFIX) {
                Some(ClientError::ObjectNotFound(key.to_string()))
            } else {
                None
            }
        }
        StatusCode::PermissionDenied => {
            let alt = StrandError::Rpc(rpc.clone());
            Some(ClientError::Joined(Box::new(JoinedError {
                main: ClientError::PermissionDenied(alt.to_string()),
                alt,
                code: rpc.code,
            })))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: StatusCode, message: &str) -> StrandError {
        StrandError::Rpc(RpcError::new(code, message))
    }

    #[test]
    fn test_end_of_stream_passes_through() {
        let err = convert_known_errors(StrandError::EndOfStream, "b", "k");
        assert!(err.is(ErrorKind::EndOfStream));
    }

    #[test]
    fn test_validation_errors_carry_offending_value() {
        let err = convert_known_errors(StrandError::NoBucket, "", "k");
        assert!(matches!(&err, ClientError::BucketNameInvalid(b) if b.is_empty()));
        assert_eq!(err.to_string(), "bucket name invalid (\"\")");

        let err = convert_known_errors(StrandError::NoPath, "b", "");
        assert!(err.is(ErrorKind::ObjectKeyInvalid));
    }

    #[test]
    fn test_local_not_found_uses_context() {
        let err = convert_known_errors(StrandError::BucketNotFound("x".into()), "b", "k");
        assert!(matches!(err, ClientError::BucketNotFound(b) if b == "b"));

        let err = convert_known_errors(StrandError::ObjectNotFound("x".into()), "b", "k");
        assert!(matches!(err, ClientError::ObjectNotFound(k) if k == "k"));
    }

    #[test]
    fn test_missing_key_material_is_permission_denied() {
        for err in [
            StrandError::MissingEncryptionBase("b".into()),
            StrandError::MissingDecryptionBase("b".into()),
        ] {
            let err = convert_known_errors(err, "b", "secret.txt");
            assert!(err.is(ErrorKind::PermissionDenied));
            assert!(err.rpc_code().is_none());
        }
    }

    #[test]
    fn test_resource_exhausted_by_suffix() {
        let err = convert_known_errors(
            rpc(StatusCode::ResourceExhausted, "project: Exceeded Usage Limit"),
            "b",
            "k",
        );
        assert!(err.is(ErrorKind::BandwidthLimitExceeded));
        assert!(err.is_rpc(StatusCode::ResourceExhausted));
        assert!(err.matches(&Exhaustion::BandwidthLimitExceeded));

        let err = convert_known_errors(rpc(StatusCode::ResourceExhausted, "Too Many Requests"), "b", "k");
        assert!(err.is(ErrorKind::TooManyRequests));

        // unknown wording keeps the original error
        let err = convert_known_errors(rpc(StatusCode::ResourceExhausted, "disk full"), "b", "k");
        assert!(err.is(ErrorKind::Other));
        assert!(err.is_rpc(StatusCode::ResourceExhausted));
        assert_eq!(err.to_string(), "rpc error: disk full");
    }

    #[test]
    fn test_remote_bucket_not_found_recovers_name() {
        let err = convert_known_errors(rpc(StatusCode::NotFound, "bucket not found: photos"), "b", "k");
        assert!(matches!(&err, ClientError::BucketNotFound(b) if b == "photos"));

        // no name in the message
        let err = convert_known_errors(rpc(StatusCode::NotFound, "bucket not found"), "b", "k");
        assert!(matches!(&err, ClientError::BucketNotFound(b) if b == "b"));

        let err = convert_known_errors(rpc(StatusCode::NotFound, "object not found: xyz"), "b", "k");
        assert!(matches!(&err, ClientError::ObjectNotFound(k) if k == "k"));

        let err = convert_known_errors(rpc(StatusCode::NotFound, "segment not found"), "b", "k");
        assert!(err.is(ErrorKind::Other));
        assert!(err.is_rpc(StatusCode::NotFound));
    }

    #[test]
    fn test_permission_denied_matches_both_representations() {
        let original = RpcError::permission_denied("access denied for path");
        let err = convert_known_errors(StrandError::Rpc(original.clone()), "b", "k");

        assert!(err.is(ErrorKind::PermissionDenied));
        assert!(err.is_rpc(StatusCode::PermissionDenied));
        assert!(err.matches(&original));
        assert_eq!(err.downcast_ref::<RpcError>(), Some(&original));
        assert!(err.downcast_ref::<StrandError>().is_some());

        let joined = err.joined().unwrap();
        assert_eq!(joined.code(), StatusCode::PermissionDenied);
        assert_eq!(joined.code().as_u64(), 7);
        assert!(joined.main().is(ErrorKind::PermissionDenied));
        assert_eq!(joined.ungroup().len(), 2);

        // unwraps to the normalized error
        let source = err.source().unwrap().downcast_ref::<ClientError>().unwrap();
        assert!(source.is(ErrorKind::PermissionDenied));
        assert_eq!(err.to_string(), "permission denied (rpc error: access denied for path)");
    }

    #[test]
    fn test_combined_picks_first_known_member() {
        let err = convert_known_errors(
            StrandError::Combined(vec![
                StrandError::Internal("flush failed".into()),
                rpc(StatusCode::NotFound, "object not found: s"),
            ]),
            "b",
            "k",
        );
        assert!(err.is(ErrorKind::ObjectNotFound));

        let err = convert_known_errors(
            StrandError::Combined(vec![StrandError::Internal("a".into()), StrandError::Canceled]),
            "b",
            "k",
        );
        assert!(matches!(err, ClientError::Wrapped(StrandError::Combined(ref e)) if e.len() == 2));
    }

    #[test]
    fn test_cancellation_kind() {
        let err = convert_known_errors(StrandError::Canceled, "b", "k");
        assert!(err.is(ErrorKind::Canceled));
        assert!(err.downcast_ref::<StrandError>().is_some());
    }

    #[test]
    fn test_invalid_upload_id_conversion() {
        let err: ClientError = strand_core::upload_id::decode("0OIl").unwrap_err().into();
        assert!(err.is(ErrorKind::UploadIdInvalid));
        assert_eq!(err.to_string(), "upload ID invalid");
    }
}
