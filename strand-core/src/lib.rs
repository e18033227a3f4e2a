//! Core data models, encryption and collaborator interfaces for strand

pub mod config;
pub mod encryption;
pub mod error;
pub mod metadata;
pub mod metainfo;
pub mod stream;
pub mod types;
pub mod upload_id;

pub use config::ProjectConfig;
pub use error::*;
pub use types::*;

/// Result type alias for strand operations
pub type Result<T> = std::result::Result<T, StrandError>;
