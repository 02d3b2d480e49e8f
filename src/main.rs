use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use driveschool_server::assistant::Assistant;
use driveschool_server::config::Config;
use driveschool_server::server::{self, AppState};
use driveschool_server::utils::init_log;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to database file
    #[arg(short, long, default_value = "./database/driveschool.db")]
    database: PathBuf,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Log directory (stdout when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let _guard = init_log(args.log_dir.clone());
    let _ = dotenvy::dotenv();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let options = SqliteConnectOptions::new()
        .filename(&args.database)
        .create_if_missing(true)
        .foreign_keys(true);
    let database = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;
    sqlx::migrate!().run(&database).await?;

    let assistant = config.assistant.as_ref().map(|c| Arc::new(Assistant::new(c)));
    if assistant.is_none() {
        info!("no assistant configured, ai endpoints will report unavailable");
    }
    let state = AppState::new(database, config.unlock_rule, assistant);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("listening on {}", args.listen);
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}
