//! File and folder operations.
//!
//! Every mutation resolves the caller first and checks ownership against the
//! stored record before touching anything. Object bytes are never handled
//! here: uploads and downloads go straight to object storage through signed
//! URLs, and deleting a file is two calls (`delete_file` then
//! `delete_object`) that are not transactional with each other.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use kernel::{File, Folder, ListedFile, Listing, UploadTicket};

use crate::config::ListScope;
use crate::domain::{DocumentStore, NewFile, NewFolder};
use crate::error::ServiceError;
use crate::object_store::{ObjectStore, SIGNED_URL_TTL};
use crate::sqlite::is_constraint_violation;
use crate::Database;

pub struct FileService {
    db: Database,
    objects: Arc<dyn ObjectStore>,
    sign_concurrency: usize,
    list_scope: ListScope,
}

impl FileService {
    #[must_use]
    pub fn new(
        db: Database,
        objects: Arc<dyn ObjectStore>,
        sign_concurrency: usize,
        list_scope: ListScope,
    ) -> Self {
        Self {
            db,
            objects,
            sign_concurrency: sign_concurrency.max(1),
            list_scope,
        }
    }

    /// Issues a signed PUT URL for a fresh, globally unique object key.
    pub async fn request_upload(
        &self,
        caller: Option<&str>,
        file_name: &str,
        file_type: &str,
    ) -> Result<UploadTicket, ServiceError> {
        let user = authenticated(caller)?;
        let file_name = non_empty(file_name, "file name")?;

        let object_key = format!("{}-{file_name}", uuid::Uuid::new_v4());
        let upload_url = self
            .objects
            .presign_put(&object_key, file_type, SIGNED_URL_TTL)
            .await?;
        tracing::info!("upload url issued to {user} for {object_key}");

        Ok(UploadTicket {
            upload_url,
            object_key,
        })
    }

    /// Records an uploaded object as a file. The object itself is not checked.
    pub async fn register_file(
        &self,
        caller: Option<&str>,
        name: &str,
        size: u64,
        object_key: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        let user = authenticated(caller)?;
        let name = non_empty(name, "file name")?;
        let object_key = non_empty(object_key, "object key")?;
        if i64::try_from(size).is_err() {
            return Err(ServiceError::InvalidInput("file size is too large".to_owned()));
        }

        let mut db = self.db.lock().await;
        check_parent(&mut *db, user, parent_id)?;

        let file = NewFile {
            name,
            size,
            storage_id: object_key,
            parent_id,
            owner_id: user,
        };
        match db.insert_file(&file) {
            Ok(id) => {
                tracing::info!("file: {name} size: {size} key: {object_key} registered as {id}");
                Ok(id)
            }
            Err(e) if is_constraint_violation(&e) => {
                tracing::warn!("object key {object_key} is already registered or awaits purge");
                Err(ServiceError::Conflict(format!("file {object_key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_folder(
        &self,
        caller: Option<&str>,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        let user = authenticated(caller)?;
        let name = non_empty(name, "folder name")?;

        let mut db = self.db.lock().await;
        check_parent(&mut *db, user, parent_id)?;

        let id = db.insert_folder(&NewFolder {
            name,
            parent_id,
            owner_id: user,
        })?;
        tracing::info!("folder: {name} created as {id} by {user}");
        Ok(id)
    }

    /// Lists one folder level. Unauthenticated callers get an empty listing.
    pub async fn list_items(
        &self,
        caller: Option<&str>,
        parent_id: Option<i64>,
    ) -> Result<Listing, ServiceError> {
        let Some(user) = caller else {
            return Ok(Listing::default());
        };
        let owner = match self.list_scope {
            ListScope::Shared => None,
            ListScope::Owner => Some(user),
        };

        let (files, folders) = {
            let mut db = self.db.lock().await;
            (db.get_files(parent_id, owner)?, db.get_folders(parent_id, owner)?)
        };

        let files: Vec<ListedFile> = stream::iter(files)
            .map(|file| self.with_download_url(file))
            .buffered(self.sign_concurrency)
            .collect()
            .await;

        Ok(Listing { files, folders })
    }

    /// Removes the file record owned by the caller. The object stays in
    /// storage until `delete_object` or the purge worker removes it.
    pub async fn delete_file(
        &self,
        caller: Option<&str>,
        object_key: &str,
    ) -> Result<(), ServiceError> {
        let user = authenticated(caller)?;

        let mut db = self.db.lock().await;
        let Some(file) = db.search_file(object_key)? else {
            tracing::error!("file not found in database: user: {user} key: {object_key}");
            return Err(ServiceError::NotFound(format!("file {object_key}")));
        };
        if file.owner_id != user {
            tracing::error!(
                "unauthorized file deletion attempt: user: {user} key: {object_key} owner: {}",
                file.owner_id
            );
            return Err(ServiceError::Unauthorized);
        }

        db.unlink_file(&file, chrono::Utc::now().timestamp())?;
        tracing::info!("file: {} ({object_key}) unlinked by {user}", file.id);
        Ok(())
    }

    /// Deletes the object from storage. Performs no ownership check of its
    /// own; callers are expected to have gone through `delete_file` first.
    pub async fn delete_object(&self, object_key: &str) -> Result<(), ServiceError> {
        if let Err(e) = self.objects.delete(object_key).await {
            tracing::error!("error deleting object {object_key} from storage: {e}");
            return Err(ServiceError::StorageDeleteFailed);
        }
        tracing::info!("object {object_key} deleted from storage");

        let mut db = self.db.lock().await;
        if let Err(e) = db.complete_purge(object_key) {
            // the purge worker will find the object gone and clear the intent
            tracing::warn!("purge intent for {object_key} not cleared: {e}");
        }
        Ok(())
    }

    /// Deletes only the folder record. Children keep their now dangling parent.
    pub async fn delete_folder(
        &self,
        caller: Option<&str>,
        folder_id: i64,
    ) -> Result<(), ServiceError> {
        let user = authenticated(caller)?;

        let mut db = self.db.lock().await;
        let folder = owned_folder(&mut *db, user, folder_id)?;
        db.delete_folder(folder.id)?;
        tracing::info!("folder: {} ({folder_id}) deleted by {user}", folder.name);
        Ok(())
    }

    async fn with_download_url(&self, file: File) -> ListedFile {
        let url = match self.objects.presign_get(&file.storage_id, SIGNED_URL_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("download url for {} not signed: {e}", file.storage_id);
                None
            }
        };
        ListedFile { file, url }
    }
}

fn authenticated(caller: Option<&str>) -> Result<&str, ServiceError> {
    caller.ok_or(ServiceError::Unauthenticated)
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, ServiceError> {
    if value.trim().is_empty() {
        Err(ServiceError::InvalidInput(format!("{what} must not be empty")))
    } else {
        Ok(value)
    }
}

fn check_parent<S>(db: &mut S, user: &str, parent_id: Option<i64>) -> Result<(), ServiceError>
where
    S: DocumentStore<Err = rusqlite::Error>,
{
    match parent_id {
        Some(id) => owned_folder(db, user, id).map(|_| ()),
        None => Ok(()),
    }
}

fn owned_folder<S>(db: &mut S, user: &str, folder_id: i64) -> Result<Folder, ServiceError>
where
    S: DocumentStore<Err = rusqlite::Error>,
{
    let Some(folder) = db.get_folder(folder_id)? else {
        tracing::error!("folder not found: user: {user} folder: {folder_id}");
        return Err(ServiceError::NotFound(format!("folder {folder_id}")));
    };
    if folder.owner_id != user {
        tracing::error!(
            "unauthorized folder access: user: {user} folder: {folder_id} owner: {}",
            folder.owner_id
        );
        return Err(ServiceError::Unauthorized);
    }
    Ok(folder)
}
