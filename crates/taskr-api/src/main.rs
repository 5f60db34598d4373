use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use clap::{Args, Parser};
use log::info;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use taskr_core::chat::ChatService;
use taskr_core::dispatch::ToolDispatcher;
use taskr_core::model::HttpModelClient;
use taskr_core::tools::TaskTools;
use taskr_core::{Config, Database};

mod auth;
mod routes;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = cli
        .common
        .config
        .unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    let db = Arc::new(Database::open(&config.database).await?);
    let model = HttpModelClient::from_config(&config.model)?;
    let dispatcher = ToolDispatcher::new(TaskTools::new(Arc::clone(&db)));
    let chat = Arc::new(ChatService::new(
        Arc::clone(&db),
        dispatcher,
        model,
        config.history_limit,
    ));

    let port = cli.common.port.unwrap_or(config.server.port);
    let state = AppState {
        config: Arc::new(config),
        db,
        chat,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route(
            "/api/{user_id}/tasks",
            get(routes::list_tasks).post(routes::create_task),
        )
        .route(
            "/api/{user_id}/tasks/{task_id}",
            get(routes::get_task)
                .put(routes::update_task)
                .delete(routes::delete_task),
        )
        .route(
            "/api/{user_id}/tasks/{task_id}/toggle",
            post(routes::toggle_task),
        )
        .route("/api/{user_id}/chat", post(routes::chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting taskr API server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Parser)]
#[command(author, version, about = "HTTP API server for taskr")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Shared handles, initialized once at startup and injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub chat: Arc<ChatService<HttpModelClient>>,
}
