use std::path::Path;

use kernel::{File, Folder};
use rusqlite::{ffi, params, Connection, Error, OptionalExtension, Row};

use crate::domain::{DocumentStore, NewFile, NewFolder, PurgeIntent};

const CACHE_SIZE: &str = "4096";

const FILE_COLUMNS: &str = "id, name, size, storage_id, parent_id, owner_id";
const FOLDER_COLUMNS: &str = "id, name, parent_id, owner_id";

pub struct Sqlite {
    conn: Connection,
}

impl DocumentStore for Sqlite {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;

        // parent_id carries no foreign key: deleting a folder orphans its children
        self.conn.execute(
            "CREATE TABLE folder (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  name         TEXT NOT NULL,
                  parent_id    INTEGER,
                  owner_id     TEXT NOT NULL,
                  created_at   TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE file (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  name         TEXT NOT NULL,
                  size         INTEGER NOT NULL CHECK (size >= 0),
                  storage_id   TEXT NOT NULL,
                  parent_id    INTEGER,
                  owner_id     TEXT NOT NULL,
                  created_at   TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE purge (
                  storage_id   TEXT PRIMARY KEY,
                  owner_id     TEXT NOT NULL,
                  requested_at INTEGER NOT NULL,
                  attempts     INTEGER NOT NULL DEFAULT 0,
                  last_error   TEXT
                  )",
            [],
        )?;

        self.conn
            .execute("CREATE INDEX folder_parent_ix ON folder(parent_id)", [])?;
        self.conn
            .execute("CREATE INDEX file_parent_ix ON file(parent_id)", [])?;
        self.conn.execute(
            "CREATE UNIQUE INDEX unique_file_storage_ix ON file(storage_id)",
            [],
        )?;

        Ok(())
    }

    fn insert_file(&mut self, file: &NewFile) -> Result<i64, Self::Err> {
        self.assign_cache_size()?;
        self.pragma_update("synchronous", "FULL")?;

        let tx = self.conn.transaction()?;
        // a key waiting for purge has its bytes scheduled for deletion
        let awaits_purge: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM purge WHERE storage_id = ?1)",
            params![file.storage_id],
            |row| row.get(0),
        )?;
        if awaits_purge {
            return Err(Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_CONSTRAINT),
                Some(format!("object {} awaits purge", file.storage_id)),
            ));
        }
        tx.prepare_cached(
            "INSERT INTO file (name, size, storage_id, parent_id, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            file.name,
            file.size,
            file.storage_id,
            file.parent_id,
            file.owner_id,
            chrono::Utc::now()
        ])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    fn insert_folder(&mut self, folder: &NewFolder) -> Result<i64, Self::Err> {
        self.pragma_update("synchronous", "FULL")?;

        self.conn
            .prepare_cached(
                "INSERT INTO folder (name, parent_id, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                folder.name,
                folder.parent_id,
                folder.owner_id,
                chrono::Utc::now()
            ])?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_folder(&mut self, id: i64) -> Result<Option<Folder>, Self::Err> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folder WHERE id = ?1");
        self.conn
            .prepare_cached(&sql)?
            .query_row(params![id], folder_from_row)
            .optional()
    }

    fn search_file(&mut self, storage_id: &str) -> Result<Option<File>, Self::Err> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM file WHERE storage_id = ?1");
        self.conn
            .prepare_cached(&sql)?
            .query_row(params![storage_id], file_from_row)
            .optional()
    }

    fn get_files(
        &mut self,
        parent_id: Option<i64>,
        owner: Option<&str>,
    ) -> Result<Vec<File>, Self::Err> {
        self.assign_cache_size()?;
        // IS matches NULL against NULL, so root level works like any other parent
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM file
             WHERE parent_id IS ?1 AND (?2 IS NULL OR owner_id = ?2)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![parent_id, owner], file_from_row)?;
        rows.collect()
    }

    fn get_folders(
        &mut self,
        parent_id: Option<i64>,
        owner: Option<&str>,
    ) -> Result<Vec<Folder>, Self::Err> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folder
             WHERE parent_id IS ?1 AND (?2 IS NULL OR owner_id = ?2)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![parent_id, owner], folder_from_row)?;
        rows.collect()
    }

    fn unlink_file(&mut self, file: &File, now: i64) -> Result<usize, Self::Err> {
        self.pragma_update("synchronous", "FULL")?;

        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM file WHERE id = ?1", params![file.id])?;
        if removed > 0 {
            tx.execute(
                "INSERT OR REPLACE INTO purge (storage_id, owner_id, requested_at, attempts)
                 VALUES (?1, ?2, ?3, 0)",
                params![file.storage_id, file.owner_id, now],
            )?;
        }
        tx.commit()?;

        Ok(removed)
    }

    fn delete_folder(&mut self, id: i64) -> Result<usize, Self::Err> {
        self.conn
            .execute("DELETE FROM folder WHERE id = ?1", params![id])
    }

    fn pending_purges(
        &mut self,
        requested_before: i64,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<PurgeIntent>, Self::Err> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(
            "SELECT storage_id, owner_id, requested_at, attempts, last_error FROM purge
             WHERE requested_at <= ?1 AND attempts < ?2
             ORDER BY requested_at
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![requested_before, max_attempts, limit], |row| {
            Ok(PurgeIntent {
                storage_id: row.get(0)?,
                owner_id: row.get(1)?,
                requested_at: row.get(2)?,
                attempts: row.get(3)?,
                last_error: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    fn complete_purge(&mut self, storage_id: &str) -> Result<usize, Self::Err> {
        self.conn
            .execute("DELETE FROM purge WHERE storage_id = ?1", params![storage_id])
    }

    fn fail_purge(&mut self, storage_id: &str, error: &str) -> Result<usize, Self::Err> {
        self.conn.execute(
            "UPDATE purge SET attempts = attempts + 1, last_error = ?2 WHERE storage_id = ?1",
            params![storage_id, error],
        )
    }
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql)
    }
}

/// Tells whether the error is a violated UNIQUE (or other) constraint.
pub fn is_constraint_violation(e: &Error) -> bool {
    matches!(e, Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn file_from_row(row: &Row) -> Result<File, Error> {
    Ok(File {
        id: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        storage_id: row.get(3)?,
        parent_id: row.get(4)?,
        owner_id: row.get(5)?,
    })
}

fn folder_from_row(row: &Row) -> Result<Folder, Error> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        owner_id: row.get(3)?,
    })
}
