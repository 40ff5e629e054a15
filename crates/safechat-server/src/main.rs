use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use safechat_api::auth::{self, AppState, AppStateInner};
use safechat_api::files::{FileStore, MAX_FILE_SIZE};
use safechat_api::middleware::require_auth;
use safechat_api::{admin, messages, notifications, reset, twofactor};
use safechat_db::{Database, MessageStore};
use safechat_relay::connection;
use safechat_relay::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    store: Arc<MessageStore>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safechat=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SAFECHAT_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("SAFECHAT_DB_PATH").unwrap_or_else(|_| "safechat.db".into());
    let key_file = std::env::var("SAFECHAT_KEY_FILE").unwrap_or_else(|_| "safechat.key".into());
    let upload_dir = std::env::var("SAFECHAT_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
    let host = std::env::var("SAFECHAT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SAFECHAT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database and the persisted content key
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let content_key = safechat_crypto::keys::load_or_create(&PathBuf::from(&key_file))?;

    // Shared state
    let store = Arc::new(MessageStore::new(db.clone(), content_key));
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        store: store.clone(),
        files: FileStore::new(PathBuf::from(&upload_dir)),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        dispatcher,
        store,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/", get(home))
        .route("/api/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/request_reset", post(reset::request_reset))
        .route("/reset_password/{token}", post(reset::reset_password))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/send_message", post(messages::send_message))
        .route("/get_thread/{thread_id}", get(messages::get_thread))
        .route("/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/delete_user", delete(auth::delete_user))
        .route("/enable_2fa", post(twofactor::enable_2fa))
        .route("/notifications", get(notifications::get_notifications))
        .route(
            "/notifications/read",
            post(notifications::mark_notifications_read),
        )
        .route("/admin/users", get(admin::list_users))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        // Attachment uploads need headroom beyond axum's 2 MB default
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + 1024 * 1024))
        .with_state(app_state);

    let ws_route = Router::new().route("/ws", get(ws_upgrade)).with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("SafeChat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn home() -> &'static str {
    "SafeChat App is Running!"
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.store, state.jwt_secret)
    })
}
