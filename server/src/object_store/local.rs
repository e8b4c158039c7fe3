//! Self-hosted object storage.
//!
//! Object bytes are kept in a SQLite blob table and served by the server's own
//! `/storage/{key}` routes. URLs are signed with a BLAKE3 keyed hash so they
//! behave like S3 presigned URLs: bound to one method, one key, an expiry and,
//! for uploads, the declared content type.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::lock::Mutex;
use rusqlite::blob::ZeroBlob;
use rusqlite::{params, Connection, DatabaseName, Error, OptionalExtension};
use url::Url;

use super::{ObjectStore, ObjectStoreError};

const KEY_CONTEXT: &str = "cloudlet 2024 local object store url signatures";
const ROUTE: &str = "storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Put,
    Get,
}

impl Access {
    fn as_str(self) -> &'static str {
        match self {
            Access::Put => "PUT",
            Access::Get => "GET",
        }
    }
}

/// Why a signed request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    Expired,
    Mismatch,
}

/// Stored object with its content type.
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct LocalObjectStore {
    conn: Mutex<Connection>,
    base: Url,
    key: [u8; 32],
}

impl fmt::Debug for LocalObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalObjectStore")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl LocalObjectStore {
    /// Opens (creating if needed) the object table in the given database file.
    pub fn open<P: AsRef<Path>>(path: P, base: Url, secret: &str) -> Result<Self, Error> {
        Self::with_connection(Connection::open(path)?, base, secret)
    }

    pub fn open_in_memory(base: Url, secret: &str) -> Result<Self, Error> {
        Self::with_connection(Connection::open_in_memory()?, base, secret)
    }

    fn with_connection(conn: Connection, base: Url, secret: &str) -> Result<Self, Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS object (
                  key           TEXT PRIMARY KEY,
                  content_type  TEXT NOT NULL,
                  data          BLOB NOT NULL
                  )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            base,
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        })
    }

    /// Signed URL for `access` to `key`, valid until `expires` (unix seconds).
    pub fn signed_url(
        &self,
        access: Access,
        key: &str,
        content_type: &str,
        expires: i64,
    ) -> Result<String, ObjectStoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ObjectStoreError::Signing(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .push(ROUTE)
            .push(key);
        let signature = self.signature(access, key, content_type, expires);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature.to_hex());
        Ok(url.to_string())
    }

    /// Checks a signature presented with a request at time `now`.
    pub fn verify(
        &self,
        access: Access,
        key: &str,
        content_type: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        if now > expires {
            return Err(SignatureError::Expired);
        }
        let presented = blake3::Hash::from_hex(signature).map_err(|_| SignatureError::Mismatch)?;
        // blake3::Hash equality is constant time
        if presented == self.signature(access, key, content_type, expires) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    pub async fn put(&self, key: &str, content_type: &str, data: &[u8]) -> Result<usize, Error> {
        let mut conn = self.conn.lock().await;
        let len = i32::try_from(data.len())
            .map_err(|e| Error::ToSqlConversionFailure(Box::new(e)))?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM object WHERE key = ?1", params![key])?;
        tx.execute(
            "INSERT INTO object (key, content_type, data) VALUES (?1, ?2, ?3)",
            params![key, content_type, &ZeroBlob(len)],
        )?;
        let rowid = tx.last_insert_rowid();

        let mut blob = tx.blob_open(DatabaseName::Main, "object", "data", rowid, false)?;
        blob.write_all(data)
            .map_err(|e| Error::ToSqlConversionFailure(Box::new(e)))?;
        blob.close()?;

        tx.commit()?;
        Ok(data.len())
    }

    pub async fn get(&self, key: &str) -> Result<Option<StoredObject>, Error> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT rowid, content_type FROM object WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((rowid, content_type)) = found else {
            return Ok(None);
        };

        let mut blob = conn.blob_open(DatabaseName::Main, "object", "data", rowid, true)?;
        let mut data = Vec::with_capacity(blob.len());
        blob.read_to_end(&mut data)
            .map_err(|e| Error::ToSqlConversionFailure(Box::new(e)))?;

        Ok(Some(StoredObject { content_type, data }))
    }

    async fn remove(&self, key: &str) -> Result<usize, Error> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM object WHERE key = ?1", params![key])
    }

    fn signature(&self, access: Access, key: &str, content_type: &str, expires: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        for part in [access.as_str(), key, content_type, &expires.to_string()] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize()
    }

    fn expiry(ttl: Duration) -> i64 {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        chrono::Utc::now().timestamp().saturating_add(ttl)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        self.signed_url(Access::Put, key, content_type, Self::expiry(ttl))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        self.signed_url(Access::Get, key, "", Self::expiry(ttl))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        match self.remove(key).await {
            Ok(0) => Err(ObjectStoreError::NotFound(key.to_owned())),
            Ok(_) => Ok(()),
            Err(e) => Err(ObjectStoreError::Backend(e.to_string())),
        }
    }
}
