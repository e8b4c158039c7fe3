#![allow(clippy::unused_async)]
use crate::error::ServiceError;
use crate::identity::Caller;
use crate::object_reply::ObjectReply;
use crate::object_store::local::{Access, SignatureError};
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, TryStreamExt};
use futures_util::StreamExt;
use kernel::{CreateFolder, Created, ErrorReply, Listing, RegisterFile, UploadRequest, UploadTicket};
use serde::Deserialize;
use std::io;
use std::time::Instant;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;

use axum::{extract::Path, http::StatusCode};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Folder to list, root level when absent
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SignedQuery {
    /// Unix time after which the URL is no longer accepted
    pub expires: i64,
    /// Hex encoded URL signature
    pub signature: String,
}

/// Issues a signed upload URL and the object key it writes to.
#[utoipa::path(
    post,
    path = "/api/uploads",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Upload URL valid for one hour", body = UploadTicket),
        (status = 400, description = "Empty file name", body = ErrorReply),
        (status = 401, description = "Not authenticated", body = ErrorReply)
    ),
    tag = "files",
    security(("bearer" = [])),
)]
pub async fn request_upload(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadTicket>, ServiceError> {
    let ticket = state
        .service
        .request_upload(caller.user(), &request.file_name, &request.file_type)
        .await?;
    Ok(Json(ticket))
}

/// Registers an uploaded object as a file.
#[utoipa::path(
    post,
    path = "/api/files",
    request_body = RegisterFile,
    responses(
        (status = 201, description = "File registered", body = Created),
        (status = 401, description = "Not authenticated", body = ErrorReply),
        (status = 403, description = "Parent folder belongs to someone else", body = ErrorReply),
        (status = 404, description = "Parent folder not found", body = ErrorReply),
        (status = 409, description = "Object key already registered", body = ErrorReply)
    ),
    tag = "files",
    security(("bearer" = [])),
)]
pub async fn register_file(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RegisterFile>,
) -> Result<impl IntoResponse, ServiceError> {
    let registration = state.service.register_file(
        caller.user(),
        &request.name,
        request.size,
        &request.object_key,
        request.parent_id,
    );
    let id = timed("register file", registration).await?;
    Ok(created(Json(Created { id })))
}

/// Creates a folder.
#[utoipa::path(
    post,
    path = "/api/folders",
    request_body = CreateFolder,
    responses(
        (status = 201, description = "Folder created", body = Created),
        (status = 401, description = "Not authenticated", body = ErrorReply),
        (status = 403, description = "Parent folder belongs to someone else", body = ErrorReply),
        (status = 404, description = "Parent folder not found", body = ErrorReply)
    ),
    tag = "folders",
    security(("bearer" = [])),
)]
pub async fn create_folder(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateFolder>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = timed(
        "create folder",
        state
            .service
            .create_folder(caller.user(), &request.name, request.parent_id),
    )
    .await?;
    Ok(created(Json(Created { id })))
}

/// Lists files and folders directly under a folder
#[utoipa::path(
    get,
    path = "/api/items",
    params(ListQuery),
    responses(
        (status = 200, description = "Folder content, empty for anonymous callers", body = Listing),
    ),
    tag = "folders",
    security(("bearer" = [])),
)]
pub async fn list_items(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing>, ServiceError> {
    let listing = timed(
        "list items",
        state.service.list_items(caller.user(), query.parent_id),
    )
    .await?;
    Ok(Json(listing))
}

/// Deletes the caller's file record. The object must be deleted separately.
#[utoipa::path(
    delete,
    path = "/api/files/{object_key}",
    responses(
        (status = 204, description = "File record deleted"),
        (status = 401, description = "Not authenticated", body = ErrorReply),
        (status = 403, description = "File belongs to someone else", body = ErrorReply),
        (status = 404, description = "File not found", body = ErrorReply)
    ),
    tag = "files",
    params(
        ("object_key" = String, Path, description = "Object key of the file")
    ),
    security(("bearer" = [])),
)]
pub async fn delete_file(
    State(state): State<AppState>,
    caller: Caller,
    Path(object_key): Path<String>,
) -> Result<StatusCode, ServiceError> {
    timed(
        "delete file",
        state.service.delete_file(caller.user(), &object_key),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes an object from storage
#[utoipa::path(
    delete,
    path = "/api/objects/{object_key}",
    responses(
        (status = 204, description = "Object deleted"),
        (status = 502, description = "Storage refused or failed the deletion", body = ErrorReply)
    ),
    tag = "files",
    params(
        ("object_key" = String, Path, description = "Object key")
    ),
)]
pub async fn delete_object(
    State(state): State<AppState>,
    Path(object_key): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_object(&object_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a folder record, leaving its content in place.
#[utoipa::path(
    delete,
    path = "/api/folders/{id}",
    responses(
        (status = 204, description = "Folder deleted"),
        (status = 401, description = "Not authenticated", body = ErrorReply),
        (status = 403, description = "Folder belongs to someone else", body = ErrorReply),
        (status = 404, description = "Folder not found", body = ErrorReply)
    ),
    tag = "folders",
    params(
        ("id" = i64, Path, description = "Folder id")
    ),
    security(("bearer" = [])),
)]
pub async fn delete_folder(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    timed("delete folder", state.service.delete_folder(caller.user(), id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stores an object through a signed upload URL (local object store only)
#[utoipa::path(
    put,
    path = "/storage/{key}",
    params(
        ("key" = String, Path, description = "Object key"),
        SignedQuery
    ),
    responses(
        (status = 200, description = "Object stored"),
        (status = 403, description = "Signature invalid or expired", body = String),
        (status = 404, description = "Local object store disabled", body = String)
    ),
    tag = "storage",
)]
pub async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(store) = state.local_store.clone() else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = store.verify(
        Access::Put,
        &key,
        &content_type,
        query.expires,
        &query.signature,
        now,
    ) {
        return forbidden(&key, e);
    }

    match read_from_stream(body.into_data_stream()).await {
        Ok((data, read_bytes)) => match store.put(&key, &content_type, &data).await {
            Ok(_) => {
                tracing::info!("object: {key} read: {read_bytes} stored");
                StatusCode::OK.into_response()
            }
            Err(e) => {
                tracing::error!("object '{key}' not stored. Error: {e}");
                internal_server_error(&e)
            }
        },
        Err(e) => {
            tracing::error!("{e}");
            internal_server_error(&e)
        }
    }
}

/// Gets object bytes through a signed download URL (local object store only)
#[utoipa::path(
    get,
    path = "/storage/{key}",
    params(
        ("key" = String, Path, description = "Object key"),
        SignedQuery
    ),
    responses(
        (status = 200, response = ObjectReply),
        (status = 403, description = "Signature invalid or expired", body = String),
        (status = 404, description = "Object not found", body = String)
    ),
    tag = "storage",
)]
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Response {
    let Some(store) = state.local_store.clone() else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = store.verify(Access::Get, &key, "", query.expires, &query.signature, now) {
        return forbidden(&key, e);
    }

    match store.get(&key).await {
        Ok(Some(object)) => {
            tracing::info!("object: {key} size: {}", object.data.len());
            ObjectReply::new(object.data, object.content_type, key).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("object '{key}' not read. Error: {e}");
            internal_server_error(&e)
        }
    }
}

async fn timed<T, F>(operation: &str, action: F) -> Result<T, ServiceError>
where
    F: std::future::Future<Output = Result<T, ServiceError>>,
{
    let start = Instant::now();
    let res = action.await;
    let duration = start.elapsed();
    tracing::info!("{operation} time: {:?}", duration);
    res
}

fn forbidden(key: &str, e: SignatureError) -> Response {
    tracing::warn!("signed request for {key} refused: {e:?}");
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

fn created<S: IntoResponse>(s: S) -> (StatusCode, Response) {
    (StatusCode::CREATED, s.into_response())
}

fn internal_server_error<E: ToString>(e: &E) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        e.to_string().into_response(),
    )
        .into_response()
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<(Vec<u8>, usize)>
where
    S: Stream<Item = Result<Bytes, E>> + StreamExt,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    let copied_bytes = tokio::io::copy(&mut body_reader, &mut buffer).await?;
    let copied_bytes = usize::try_from(copied_bytes).unwrap_or(usize::MAX);
    Ok((buffer, copied_bytes))
}
