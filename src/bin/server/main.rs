use anyhow::{Context, Result};
use clap::Parser;
use edge_app_server::{
    adapters::inbound::http::router::{create_router, AppState},
    app::{AppBuilder, BindingConfig},
    config::{BindingEnv, FromEnv, ServerEnv},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "edge-app-server")]
#[command(about = "HTTP server for the auth and procedure endpoints", long_about = None)]
struct Cli {
    /// Server port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000")]
    port: u16,

    /// Server host to bind to
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Run without database and bucket bindings
    #[arg(long, env = "LOCAL_CONTEXT", default_value = "false")]
    local: bool,

    /// Create the auth tables before serving
    #[arg(long, env = "MIGRATE_ON_START", default_value = "false")]
    migrate: bool,

    /// Log level or full filter directive (e.g. `info,sqlx=warn`)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn init_logging(&self) -> Result<()> {
        let env_filter = EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("Invalid log filter '{}'", self.log_level))?;

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install the tracing subscriber")?;

        Ok(())
    }

    fn binding_config(&self) -> Result<BindingConfig> {
        let binding = BindingEnv::from_env().context("Invalid binding environment")?;
        let server = ServerEnv::from_env().context("Invalid server environment")?;

        let environment = server.environment.unwrap_or_default();
        if environment.is_production() && server.auth_secret.is_none() {
            anyhow::bail!("BETTER_AUTH_SECRET is required when ENVIRONMENT=production");
        }

        let mut config = BindingConfig::from_env_config(&binding, &server)?;
        config.migrate = self.migrate;
        Ok(config)
    }

    async fn app_state(&self) -> Result<AppState> {
        if self.local {
            warn!("Running with a local context; database queries will fail");
            return Ok(AppState::local());
        }

        let config = self.binding_config()?;
        info!(
            database = ?config.database_backend,
            bucket = ?config.bucket_backend,
            environment = %config.environment,
            "Building bindings"
        );

        let bindings = AppBuilder::new()
            .with_config(config)
            .build()
            .await
            .context("Failed to build bindings")?;
        Ok(AppState::new(bindings))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    cli.init_logging()?;

    info!("Starting edge app server");

    let state = cli.app_state().await?;
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_app_server::app::{BucketBackend, DatabaseBackend};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "edge-app-server",
            "--port",
            "8080",
            "--local",
            "--log-level",
            "debug,sqlx=warn",
        ]);

        assert_eq!(cli.port, 8080);
        assert!(cli.local);
        assert!(!cli.migrate);
        assert_eq!(cli.log_level, "debug,sqlx=warn");
    }

    #[test]
    fn test_binding_config_from_env() {
        temp_env::with_vars(
            [
                ("D1_DATABASE_URL", Some("sqlite::memory:")),
                ("BUCKET_BACKEND", None),
                ("ENVIRONMENT", Some("preview")),
                ("BETTER_AUTH_SECRET", None),
            ],
            || {
                let cli = Cli::parse_from(["edge-app-server", "--migrate"]);
                let config = cli.binding_config().unwrap();
                assert_eq!(
                    config.database_backend,
                    DatabaseBackend::Sqlite {
                        url: "sqlite::memory:".into()
                    }
                );
                assert_eq!(config.bucket_backend, BucketBackend::InMemory);
                assert!(config.migrate);
            },
        );
    }

    #[test]
    fn test_production_requires_secret() {
        temp_env::with_vars(
            [("ENVIRONMENT", Some("production")), ("BETTER_AUTH_SECRET", None::<&str>)],
            || {
                let cli = Cli::parse_from(["edge-app-server"]);
                let err = cli.binding_config().unwrap_err();
                assert!(err.to_string().contains("BETTER_AUTH_SECRET"));
            },
        );
    }
}
