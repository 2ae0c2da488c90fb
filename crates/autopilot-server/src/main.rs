//! AutoPilot REST server
//!
//! Exposes the unread listing, per-message summaries and the conversational
//! agent over HTTP for the web frontend.

mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use autopilot_core::agent::Agent;
use autopilot_core::config::{get_config_dir, Config};
use autopilot_core::gmail::GmailClient;
use autopilot_core::llm::OllamaClient;
use autopilot_core::oauth::OAuthManager;
use autopilot_core::token_provider::create_token_provider;
use autopilot_core::tools::MailTools;

use routes::AppState;

#[derive(Parser)]
#[command(name = "autopilot-server")]
#[command(about = "AutoPilot email assistant REST server", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Console plus daily rolling file logging. The guard must outlive the server.
fn init_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = &config.general.log_dir;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "server.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn build_state(config: &Config) -> Result<web::Data<AppState>> {
    let token_provider = create_token_provider(config);
    let oauth = Arc::new(OAuthManager::new(config.google.clone(), token_provider));
    let mail = Arc::new(GmailClient::new(config.google.api_base.clone(), oauth));
    let completion = Arc::new(OllamaClient::new(&config.model)?);

    let tools = Arc::new(MailTools::new(mail, completion.clone(), config.mail.clone()));
    let agent = Arc::new(Agent::new(completion, tools.clone(), config.agent.clone()));

    Ok(web::Data::new(AppState { tools, agent }))
}

fn cors(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| get_config_dir().join("config.toml"));
    let mut config = Config::load_with_env(&config_path)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let _guard = init_logging(&config)?;

    info!("AutoPilot server starting");
    info!("Model: {} at {}", config.model.name, config.model.base_url);
    if let Some(address) = &config.google.address {
        info!("Mailbox: {}", address);
    }

    let state = build_state(&config)?;
    let origins = config.server.allowed_origins.clone();
    let bind = (config.server.host.clone(), config.server.port);

    info!("Listening on http://{}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors(&origins))
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .configure(routes::config)
    })
    .bind(bind)?
    .run()
    .await?;

    info!("AutoPilot server stopped");
    Ok(())
}
