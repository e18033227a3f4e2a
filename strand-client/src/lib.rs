//! strand client SDK: resumable, encrypted multipart uploads

pub mod error;
pub mod listing;
pub mod multipart;
pub mod project;

pub use error::{convert_known_errors, ClientError, ErrorKind, Exhaustion, JoinedError};
pub use listing::{ListUploadPartsOptions, ListUploadsOptions, PartIterator, UploadIterator};
pub use multipart::PartUpload;
pub use project::{CommitUploadOptions, Project, UploadOptions};

pub type Result<T> = std::result::Result<T, ClientError>;
