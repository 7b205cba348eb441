use anyhow::Context;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use voice_domain::config::CorsConfig;
use voice_gateway::bootstrap::{build_app_state, spawn_session_sweeper};
use voice_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = voice_gateway::cli::load_config()?;
            run_server(config).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = voice_gateway::cli::load_config()?;
            let passed = voice_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = voice_gateway::cli::load_config()?;
            let valid = voice_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = voice_gateway::cli::load_config()?;
            voice_gateway::cli::config::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,voice_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: voice_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!("voice-gateway starting");

    let host = config.server.host.clone();
    let port = config.server.port;
    let cors = config.server.cors.clone();

    let state = build_app_state(config).context("building application state")?;
    spawn_session_sweeper(&state);

    let cors_layer = build_cors_layer(&cors);
    let app = voice_gateway::api::router(state).layer(cors_layer);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "voice-gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// carry a trailing `:*` wildcard port (e.g. `http://localhost:*`).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
