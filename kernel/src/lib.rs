#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifetime of every signed upload and download URL, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// Represents a file registered in the system.
///
/// The bytes live in object storage under `storage_id`; this record only
/// carries metadata and the position in the folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct File {
    /// Unique numeric identifier for the file
    pub id: i64,
    /// Display name as uploaded
    pub name: String,
    /// Size of the file in bytes
    pub size: u64,
    /// Object key of the bytes in the storage bucket
    pub storage_id: String,
    /// Folder containing the file, `None` for root level
    pub parent_id: Option<i64>,
    /// Identifier of the user who registered the file
    pub owner_id: String,
}

/// Represents a folder. Folders nest through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Folder {
    /// Unique numeric identifier for the folder
    pub id: i64,
    /// Folder name
    pub name: String,
    /// Enclosing folder, `None` for root level
    pub parent_id: Option<i64>,
    /// Identifier of the user who created the folder
    pub owner_id: String,
}

/// A file as returned by a listing, with a freshly signed download URL.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListedFile {
    #[serde(flatten)]
    pub file: File,
    /// Signed GET URL, `None` when signing failed for this file
    pub url: Option<String>,
}

/// Content of one folder level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Listing {
    pub files: Vec<ListedFile>,
    pub folders: Vec<Folder>,
}

/// Asks for a signed upload URL.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadRequest {
    /// Original file name, becomes part of the object key
    pub file_name: String,
    /// MIME type the upload must be sent with
    pub file_type: String,
}

/// Signed upload URL and the object key it writes to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadTicket {
    pub upload_url: String,
    pub object_key: String,
}

/// Registers an uploaded object as a file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterFile {
    pub name: String,
    pub size: u64,
    pub object_key: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Creates a folder.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateFolder {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Identifier of a newly created record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Created {
    pub id: i64,
}

/// Error body returned by the API. The message never carries internal detail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorReply {
    pub error: String,
}
