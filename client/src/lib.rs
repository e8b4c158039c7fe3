use std::path::Path;

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use kernel::{CreateFolder, Created, ErrorReply, Listing, RegisterFile, UploadRequest, UploadTicket};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use resource::Resource;
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub mod resource;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server address: {0}")]
    InvalidUri(String),

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server replied {status}: {message}")]
    Api { status: u16, message: String },
}

/// Talks to a cloudlet server on behalf of one session.
pub struct Cloudlet {
    client: Client,
    base: Resource,
    token: Option<String>,
}

impl Cloudlet {
    pub fn new(uri: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base = Resource::new(uri).ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))?;
        Ok(Self {
            client: Client::new(),
            base,
            token,
        })
    }

    /// Uploads a local file through a signed URL and registers it.
    /// Returns the new file id and the object key.
    pub async fn upload(
        &self,
        path: &Path,
        parent_id: Option<i64>,
    ) -> Result<(i64, String), ClientError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.display().to_string()))?;
        let file_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        let ticket: UploadTicket = self
            .send(self.post("api/uploads").json(&UploadRequest {
                file_name: name.to_owned(),
                file_type: file_type.clone(),
            }))
            .await?
            .json()
            .await?;

        let f = File::open(path).await?;
        let size = f.metadata().await?.len();
        let stream = reqwest::Body::wrap_stream(ReaderStream::new(f));
        self.send(
            self.client
                .put(&ticket.upload_url)
                .header(CONTENT_TYPE, file_type)
                .header(CONTENT_LENGTH, size)
                .body(stream),
        )
        .await?;

        let created: Created = self
            .send(self.post("api/files").json(&RegisterFile {
                name: name.to_owned(),
                size,
                object_key: ticket.object_key.clone(),
                parent_id,
            }))
            .await?
            .json()
            .await?;
        Ok((created.id, ticket.object_key))
    }

    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, ClientError> {
        let created: Created = self
            .send(self.post("api/folders").json(&CreateFolder {
                name: name.to_owned(),
                parent_id,
            }))
            .await?
            .json()
            .await?;
        Ok(created.id)
    }

    pub async fn list(&self, parent_id: Option<i64>) -> Result<Listing, ClientError> {
        let mut resource = self.resource("api/items");
        if let Some(id) = parent_id {
            resource.set_query("parent_id", &id.to_string());
        }
        let request = self.authorized(self.client.get(resource.to_string()));
        Ok(self.send(request).await?.json().await?)
    }

    /// Deletes the file record and then its object.
    pub async fn remove(&self, object_key: &str) -> Result<(), ClientError> {
        let mut resource = self.resource("api/files");
        resource.append_segment(object_key);
        self.send(self.authorized(self.client.delete(resource.to_string())))
            .await?;

        let mut resource = self.resource("api/objects");
        resource.append_segment(object_key);
        self.send(self.authorized(self.client.delete(resource.to_string())))
            .await?;
        Ok(())
    }

    pub async fn remove_folder(&self, id: i64) -> Result<(), ClientError> {
        let mut resource = self.resource("api/folders");
        resource.append_segment(&id.to_string());
        self.send(self.authorized(self.client.delete(resource.to_string())))
            .await?;
        Ok(())
    }

    fn resource(&self, path: &str) -> Resource {
        let mut resource = self.base.clone();
        resource.append_path(path);
        resource
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.post(self.resource(path).to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = match response.json::<ErrorReply>().await {
            Ok(reply) => reply.error,
            Err(_) => status.canonical_reason().unwrap_or_default().to_owned(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Renders a listing: folders first, then files.
#[must_use]
pub fn listing_table(listing: &Listing) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Id").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Owner").add_attribute(Attribute::Bold),
            Cell::new("Object key").add_attribute(Attribute::Bold),
        ]);

    for f in &listing.folders {
        table.add_row(vec![
            Cell::new(f.id),
            Cell::new(format!("{}/", f.name)),
            Cell::new(""),
            Cell::new(&f.owner_id),
            Cell::new(""),
        ]);
    }
    for f in &listing.files {
        table.add_row(vec![
            Cell::new(f.file.id),
            Cell::new(&f.file.name),
            Cell::new(f.file.size),
            Cell::new(&f.file.owner_id),
            Cell::new(&f.file.storage_id),
        ]);
    }
    table
}
