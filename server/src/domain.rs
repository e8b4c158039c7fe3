use std::fmt::{Debug, Display};

use kernel::{File, Folder};

/// File record about to be inserted.
pub struct NewFile<'a> {
    pub name: &'a str,
    pub size: u64,
    pub storage_id: &'a str,
    pub parent_id: Option<i64>,
    pub owner_id: &'a str,
}

/// Folder record about to be inserted.
pub struct NewFolder<'a> {
    pub name: &'a str,
    pub parent_id: Option<i64>,
    pub owner_id: &'a str,
}

/// Object deletion recorded when its file record was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeIntent {
    pub storage_id: String,
    pub owner_id: String,
    pub requested_at: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub trait DocumentStore {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    fn insert_file(&mut self, file: &NewFile) -> Result<i64, Self::Err>;

    fn insert_folder(&mut self, folder: &NewFolder) -> Result<i64, Self::Err>;

    fn get_folder(&mut self, id: i64) -> Result<Option<Folder>, Self::Err>;

    fn search_file(&mut self, storage_id: &str) -> Result<Option<File>, Self::Err>;

    /// Files whose parent is exactly `parent_id`, optionally limited to one owner.
    fn get_files(&mut self, parent_id: Option<i64>, owner: Option<&str>)
        -> Result<Vec<File>, Self::Err>;

    /// Folders whose parent is exactly `parent_id`, optionally limited to one owner.
    fn get_folders(
        &mut self,
        parent_id: Option<i64>,
        owner: Option<&str>,
    ) -> Result<Vec<Folder>, Self::Err>;

    /// Removes the file record and records a purge intent for its object atomically.
    fn unlink_file(&mut self, file: &File, now: i64) -> Result<usize, Self::Err>;

    fn delete_folder(&mut self, id: i64) -> Result<usize, Self::Err>;

    fn pending_purges(
        &mut self,
        requested_before: i64,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PurgeIntent>, Self::Err>;

    fn complete_purge(&mut self, storage_id: &str) -> Result<usize, Self::Err>;

    fn fail_purge(&mut self, storage_id: &str, error: &str) -> Result<usize, Self::Err>;
}
