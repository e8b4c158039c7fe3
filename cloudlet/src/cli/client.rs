use std::path::Path;

use client::{listing_table, ClientError, Cloudlet};

pub struct Session {
    pub uri: String,
    pub token: Option<String>,
}

impl Session {
    fn connect(&self) -> Result<Cloudlet, ClientError> {
        Cloudlet::new(&self.uri, self.token.clone())
    }
}

pub async fn upload(session: &Session, file: &Path, parent_id: Option<i64>) -> Result<(), ClientError> {
    let (id, key) = session.connect()?.upload(file, parent_id).await?;
    println!("file {} uploaded. Id: {id} Object key: {key}", file.display());
    Ok(())
}

pub async fn mkdir(session: &Session, name: &str, parent_id: Option<i64>) -> Result<(), ClientError> {
    let id = session.connect()?.create_folder(name, parent_id).await?;
    println!("folder {name} created. Id: {id}");
    Ok(())
}

pub async fn ls(session: &Session, parent_id: Option<i64>) -> Result<(), ClientError> {
    let listing = session.connect()?.list(parent_id).await?;
    println!("{}", listing_table(&listing));
    Ok(())
}

pub async fn rm(session: &Session, object_key: &str) -> Result<(), ClientError> {
    session.connect()?.remove(object_key).await?;
    println!("file {object_key} deleted");
    Ok(())
}

pub async fn rmdir(session: &Session, id: i64) -> Result<(), ClientError> {
    session.connect()?.remove_folder(id).await?;
    println!("folder {id} deleted");
    Ok(())
}
