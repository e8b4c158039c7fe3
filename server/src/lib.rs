use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use futures::lock::Mutex;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use url::Url;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod domain;
pub mod error;
mod handlers;
pub mod identity;
pub mod object_reply;
pub mod object_store;
pub mod purge;
pub mod service;
pub mod sqlite;

extern crate serde;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::{Backend, Config};
use crate::domain::DocumentStore;
use crate::error::StartupError;
use crate::identity::Identity;
use crate::object_store::{LocalObjectStore, ObjectStore, S3ObjectStore};
use crate::purge::PurgeWorker;
use crate::service::FileService;
use crate::sqlite::Sqlite;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub type Database = Arc<Mutex<Sqlite>>;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FileService>,
    pub identity: Arc<Identity>,
    /// Set only when objects are kept by the server itself
    pub local_store: Option<Arc<LocalObjectStore>>,
}

/// Everything the server runs on, built from configuration.
pub struct Services {
    pub state: AppState,
    pub db: Database,
    pub objects: Arc<dyn ObjectStore>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::request_upload,
        handlers::register_file,
        handlers::create_folder,
        handlers::list_items,
        handlers::delete_file,
        handlers::delete_object,
        handlers::delete_folder,
        handlers::put_object,
        handlers::get_object,
    ),
    components(
        schemas(
            kernel::File,
            kernel::Folder,
            kernel::ListedFile,
            kernel::Listing,
            kernel::UploadRequest,
            kernel::UploadTicket,
            kernel::RegisterFile,
            kernel::CreateFolder,
            kernel::Created,
            kernel::ErrorReply,
        ),
        responses(object_reply::ObjectReply)
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "files", description = "File upload, registration and deletion"),
        (name = "folders", description = "Folder hierarchy and listing"),
        (name = "storage", description = "Signed URL targets of the local object store"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cloudlet=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment
    let config = Config::from_env()?;
    let services = build_services(&config)?;

    if config.purge.enabled {
        PurgeWorker::new(services.db.clone(), services.objects.clone(), config.purge.clone())
            .start();
    }

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}");

    let app = create_routes(services.state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Opens the document store and the configured object store.
pub fn build_services(config: &Config) -> Result<Services, StartupError> {
    let db = open_database(config)?;
    let db: Database = Arc::new(Mutex::new(db));

    let (objects, local_store): (Arc<dyn ObjectStore>, Option<Arc<LocalObjectStore>>) =
        match &config.backend {
            Backend::S3 { bucket, endpoint } => {
                tracing::info!("objects are kept in bucket {bucket}");
                let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
                    &config.credentials,
                    bucket,
                    endpoint.as_deref(),
                ));
                (store, None)
            }
            Backend::Local { objects_file } => {
                tracing::info!("objects are kept in {}", objects_file.display());
                let base = Url::parse(&config.public_url)?;
                let store = Arc::new(LocalObjectStore::open(
                    objects_file,
                    base,
                    &config.session_secret,
                )?);
                (store.clone(), Some(store))
            }
        };

    let service = FileService::new(
        db.clone(),
        objects.clone(),
        config.sign_concurrency,
        config.list_scope,
    );

    Ok(Services {
        state: AppState {
            service: Arc::new(service),
            identity: Arc::new(Identity::new(&config.session_secret)),
            local_store,
        },
        db,
        objects,
    })
}

fn open_database(config: &Config) -> Result<Sqlite, StartupError> {
    let path = &config.db_file;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let exists = path.exists();
    let db = Sqlite::open(path)?;
    if !exists {
        tracing::info!("creating database {}", path.display());
        db.new_database()?;
    }
    Ok(db)
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/uploads", post(handlers::request_upload))
        .route("/api/files", post(handlers::register_file))
        .route("/api/files/:object_key", delete(handlers::delete_file))
        .route("/api/objects/:object_key", delete(handlers::delete_object))
        .route("/api/folders", post(handlers::create_folder))
        .route("/api/folders/:id", delete(handlers::delete_folder))
        .route("/api/items", get(handlers::list_items))
        .route(
            "/storage/:key",
            put(handlers::put_object).get(handlers::get_object),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(
                    2 * 1024 * 1024 * 1024, /* 2GB */
                ))
                .into_inner(),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
