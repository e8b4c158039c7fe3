use futures::channel::oneshot;
use futures::channel::oneshot::Sender;
use http::StatusCode;
use kernel::{Created, Listing, UploadTicket};
use reqwest::Client;
use serde_json::json;
use serial_test::serial;
use server::config::Config;
use server::identity::Identity;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use test_context::{test_context, AsyncTestContext};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const SESSION_SECRET: &str = "integration-secret";
const PDF: &str = "application/pdf";

struct CloudletAsyncContext {
    _root: TempDir,
    base: String,
    identity: Identity,
    client: Client,
    shutdown: Sender<()>,
    join: JoinHandle<()>,
}

impl CloudletAsyncContext {
    fn token(&self, user: &str) -> String {
        self.identity
            .issue(user, Duration::from_secs(3600))
            .unwrap()
    }

    fn uri(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn create_folder(&self, user: &str, name: &str, parent_id: Option<i64>) -> i64 {
        let response = self
            .client
            .post(self.uri("/api/folders"))
            .bearer_auth(self.token(user))
            .json(&json!({ "name": name, "parent_id": parent_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json::<Created>().await.unwrap().id
    }

    async fn request_upload(&self, user: &str, name: &str, file_type: &str) -> UploadTicket {
        let response = self
            .client
            .post(self.uri("/api/uploads"))
            .bearer_auth(self.token(user))
            .json(&json!({ "file_name": name, "file_type": file_type }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    /// Uploads through a signed URL and registers the result.
    async fn upload(&self, user: &str, name: &str, content: &[u8], parent_id: Option<i64>) -> String {
        let ticket = self.request_upload(user, name, PDF).await;
        let put = self
            .client
            .put(&ticket.upload_url)
            .header("content-type", PDF)
            .body(content.to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);

        let registered = self
            .client
            .post(self.uri("/api/files"))
            .bearer_auth(self.token(user))
            .json(&json!({
                "name": name,
                "size": content.len(),
                "object_key": ticket.object_key,
                "parent_id": parent_id,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(registered.status(), StatusCode::CREATED);
        ticket.object_key
    }

    async fn list(&self, user: Option<&str>, parent_id: Option<i64>) -> Listing {
        let mut request = self.client.get(self.uri("/api/items"));
        if let Some(id) = parent_id {
            request = request.query(&[("parent_id", id)]);
        }
        if let Some(user) = user {
            request = request.bearer_auth(self.token(user));
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }
}

impl AsyncTestContext for CloudletAsyncContext {
    async fn setup() -> CloudletAsyncContext {
        let root = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let base = format!("http://127.0.0.1:{port}");

        let data_dir = root.path().to_str().unwrap().to_owned();
        let vars: HashMap<&str, String> = HashMap::from([
            ("CLOUDLET_AWS_REGION", "local".to_owned()),
            ("CLOUDLET_AWS_ACCESS_KEY_ID", "unused".to_owned()),
            ("CLOUDLET_AWS_SECRET_ACCESS_KEY", "unused".to_owned()),
            ("CLOUDLET_SESSION_SECRET", SESSION_SECRET.to_owned()),
            ("CLOUDLET_OBJECT_STORE", "local".to_owned()),
            ("CLOUDLET_DATA_DIR", data_dir),
            ("CLOUDLET_PUBLIC_URL", base.clone()),
            ("CLOUDLET_SIGN_CONCURRENCY", "4".to_owned()),
        ]);
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        let services = server::build_services(&config).unwrap();

        let (send, recv) = oneshot::channel::<()>();
        let app = server::create_routes(services.state);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    recv.await.unwrap_or_default();
                })
                .await
                .unwrap();
        });

        CloudletAsyncContext {
            _root: root,
            base,
            identity: Identity::new(SESSION_SECRET),
            client: Client::new(),
            shutdown: send,
            join: task,
        }
    }

    async fn teardown(self) {
        self.shutdown.send(()).unwrap_or_default();
        self.join.await.unwrap_or_default();
    }
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_list_and_download(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let content: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let docs = ctx.create_folder("alice", "Docs", None).await;
    let key = ctx.upload("alice", "a.pdf", &content, Some(docs)).await;

    // Act
    let listing = ctx.list(Some("alice"), Some(docs)).await;

    // Assert
    assert!(listing.folders.is_empty());
    assert_eq!(listing.files.len(), 1);
    let listed = &listing.files[0];
    assert_eq!(listed.file.name, "a.pdf");
    assert_eq!(listed.file.size, content.len() as u64);
    assert_eq!(listed.file.storage_id, key);
    assert_eq!(listed.file.owner_id, "alice");
    assert_eq!(listed.file.parent_id, Some(docs));

    let download = ctx
        .client
        .get(listed.url.as_deref().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(download.headers()["content-type"], PDF);
    assert_eq!(download.bytes().await.unwrap().as_ref(), content.as_slice());
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn root_listing_shows_folders(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let docs = ctx.create_folder("alice", "Docs", None).await;
    let nested = ctx.create_folder("alice", "Nested", Some(docs)).await;

    // Act
    let root = ctx.list(Some("alice"), None).await;
    let inside = ctx.list(Some("alice"), Some(docs)).await;

    // Assert
    assert_eq!(root.folders.len(), 1);
    assert_eq!(root.folders[0].id, docs);
    assert_eq!(root.folders[0].name, "Docs");
    assert_eq!(inside.folders.len(), 1);
    assert_eq!(inside.folders[0].id, nested);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn anonymous_listing_is_empty(ctx: &mut CloudletAsyncContext) {
    // Arrange
    ctx.create_folder("alice", "Docs", None).await;
    ctx.upload("alice", "a.pdf", b"pdf", None).await;

    // Act
    let listing = ctx.list(None, None).await;

    // Assert
    assert!(listing.files.is_empty());
    assert!(listing.folders.is_empty());
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn anonymous_upload_request_rejected(ctx: &mut CloudletAsyncContext) {
    // Act
    let response = ctx
        .client
        .post(ctx.uri("/api/uploads"))
        .json(&json!({ "file_name": "a.pdf", "file_type": PDF }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn invalid_token_is_anonymous(ctx: &mut CloudletAsyncContext) {
    // Act
    let response = ctx
        .client
        .post(ctx.uri("/api/folders"))
        .bearer_auth("not.a.token")
        .json(&json!({ "name": "Docs" }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn foreign_file_deletion_forbidden(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let key = ctx.upload("alice", "a.pdf", b"pdf", None).await;

    // Act
    let response = ctx
        .client
        .delete(ctx.uri(&format!("/api/files/{}", urlencoding::encode(&key))))
        .bearer_auth(ctx.token("bob"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.list(Some("alice"), None).await.files.len(), 1);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn missing_file_deletion_not_found(ctx: &mut CloudletAsyncContext) {
    // Act
    let response = ctx
        .client
        .delete(ctx.uri("/api/files/unknown-key"))
        .bearer_auth(ctx.token("alice"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn delete_file_then_object(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let key = ctx.upload("alice", "a.pdf", b"pdf", None).await;
    let escaped = urlencoding::encode(&key).into_owned();

    // Act
    let file = ctx
        .client
        .delete(ctx.uri(&format!("/api/files/{escaped}")))
        .bearer_auth(ctx.token("alice"))
        .send()
        .await
        .unwrap();
    let object = ctx
        .client
        .delete(ctx.uri(&format!("/api/objects/{escaped}")))
        .send()
        .await
        .unwrap();
    let again = ctx
        .client
        .delete(ctx.uri(&format!("/api/objects/{escaped}")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(file.status(), StatusCode::NO_CONTENT);
    assert_eq!(object.status(), StatusCode::NO_CONTENT);
    assert_eq!(again.status(), StatusCode::BAD_GATEWAY);
    assert!(ctx.list(Some("alice"), None).await.files.is_empty());
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn deleting_folder_orphans_content(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let docs = ctx.create_folder("alice", "Docs", None).await;
    let key = ctx.upload("alice", "a.pdf", b"pdf", Some(docs)).await;

    // Act
    let response = ctx
        .client
        .delete(ctx.uri(&format!("/api/folders/{docs}")))
        .bearer_auth(ctx.token("alice"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(ctx.list(Some("alice"), None).await.folders.is_empty());
    let orphans = ctx.list(Some("alice"), Some(docs)).await;
    assert_eq!(orphans.files.len(), 1);
    assert_eq!(orphans.files[0].file.storage_id, key);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn foreign_folder_deletion_forbidden(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let docs = ctx.create_folder("alice", "Docs", None).await;

    // Act
    let response = ctx
        .client
        .delete(ctx.uri(&format!("/api/folders/{docs}")))
        .bearer_auth(ctx.token("bob"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn registering_key_twice_conflicts(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let key = ctx.upload("alice", "a.pdf", b"pdf", None).await;

    // Act
    let response = ctx
        .client
        .post(ctx.uri("/api/files"))
        .bearer_auth(ctx.token("alice"))
        .json(&json!({ "name": "b.pdf", "size": 3, "object_key": key }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn registering_under_missing_folder_not_found(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let ticket = ctx.request_upload("alice", "a.pdf", PDF).await;

    // Act
    let response = ctx
        .client
        .post(ctx.uri("/api/files"))
        .bearer_auth(ctx.token("alice"))
        .json(&json!({
            "name": "a.pdf",
            "size": 3,
            "object_key": ticket.object_key,
            "parent_id": 4242,
        }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn tampered_signature_forbidden(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let ticket = ctx.request_upload("alice", "a.pdf", PDF).await;
    let tampered = ticket.upload_url.replace("signature=", "signature=00");

    // Act
    let response = ctx
        .client
        .put(tampered)
        .header("content-type", PDF)
        .body("pdf")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_with_other_content_type_forbidden(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let ticket = ctx.request_upload("alice", "a.pdf", PDF).await;

    // Act
    let response = ctx
        .client
        .put(&ticket.upload_url)
        .header("content-type", "text/plain")
        .body("pdf")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_url_cannot_download(ctx: &mut CloudletAsyncContext) {
    // Arrange
    let ticket = ctx.request_upload("alice", "a.pdf", PDF).await;
    let put = ctx
        .client
        .put(&ticket.upload_url)
        .header("content-type", PDF)
        .body("pdf")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);

    // Act
    let response = ctx.client.get(&ticket.upload_url).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test_context(CloudletAsyncContext)]
#[tokio::test]
#[serial]
async fn openapi_document_served(ctx: &mut CloudletAsyncContext) {
    // Act
    let response = ctx
        .client
        .get(ctx.uri("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"]["/api/items"].is_object());
}
