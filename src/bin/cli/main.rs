use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edge_app_server::{
    adapters::outbound::{
        persistence::{create_db, D1Database, D1HttpClient},
        storage::public_url,
    },
    config::{process_vars, BindingEnv, DatabaseEnv, FromEnv, MigrationEnv, ServerEnv},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "edge-app-cli")]
#[command(about = "Environment checks, schema migration and helpers", long_about = None)]
struct Cli {
    /// Log level or full filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate environment variables against a schema
    CheckEnv {
        #[arg(short, long, value_enum, default_value = "all")]
        schema: SchemaName,
    },

    /// Create the auth tables
    Migrate {
        /// Apply to the remote D1 database over the HTTP API
        #[arg(long)]
        remote: bool,

        /// Local SQLite URL; defaults to D1_DATABASE_URL
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Print the public URL of an object
    PublicUrl {
        /// Cloudflare account id
        #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
        account_id: String,

        /// Bucket name
        #[arg(long, env = "R2_BUCKET_NAME")]
        bucket: String,

        /// Object key
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SchemaName {
    Server,
    Database,
    Migration,
    Binding,
    All,
}

/// Print every declared key of `T`'s schema; returns the number of violations
fn report<T: FromEnv>(name: &str) -> usize {
    let (env, mut violations) = T::SCHEMA.check(process_vars());
    violations.extend(T::cross_check(&env));

    println!("[{}]", name);
    for (key, value) in env.redacted() {
        match value {
            Some(value) => println!("  {} = {}", key, value),
            None => println!("  {} (unset)", key),
        }
    }
    for violation in &violations {
        println!("  ! {}", violation);
    }
    violations.len()
}

fn check_env(schema: SchemaName) -> Result<()> {
    let selected = |name| schema == SchemaName::All || schema == name;

    let mut violations = 0;
    if selected(SchemaName::Server) {
        violations += report::<ServerEnv>("server");
    }
    if selected(SchemaName::Database) {
        violations += report::<DatabaseEnv>("database");
    }
    if selected(SchemaName::Migration) {
        violations += report::<MigrationEnv>("migration");
    }
    if selected(SchemaName::Binding) {
        violations += report::<BindingEnv>("binding");
    }

    if violations > 0 {
        anyhow::bail!("{} environment problem(s) found", violations);
    }
    println!("Environment OK");
    Ok(())
}

async fn migrate(remote: bool, database_url: Option<String>) -> Result<()> {
    if remote {
        let env = MigrationEnv::from_env().context("Remote migration needs Cloudflare credentials")?;
        let statements = D1HttpClient::new(&env)
            .migrate()
            .await
            .context("Remote migration failed")?;
        println!("Applied {} statement(s) to D1 database {}", statements, env.database_id);
        return Ok(());
    }

    let url = match database_url {
        Some(url) => url,
        None => BindingEnv::from_env()
            .context("Invalid binding environment")?
            .d1_database_url
            .context("Pass --database-url or set D1_DATABASE_URL")?,
    };

    let database = D1Database::connect_lazy(&url).context("Invalid database URL")?;
    create_db(&database)
        .migrate()
        .await
        .with_context(|| format!("Migration of {} failed", url))?;
    println!("Schema applied to {}", url);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let env_filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("Invalid log filter '{}'", cli.log_level))?;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    match cli.command {
        Commands::CheckEnv { schema } => check_env(schema),
        Commands::Migrate {
            remote,
            database_url,
        } => migrate(remote, database_url).await,
        Commands::PublicUrl {
            account_id,
            bucket,
            key,
        } => {
            println!("{}", public_url(&account_id, &bucket, &key));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["edge-app-cli", "check-env", "--schema", "migration"]);
        assert!(matches!(
            cli.command,
            Commands::CheckEnv {
                schema: SchemaName::Migration
            }
        ));

        let cli = Cli::parse_from([
            "edge-app-cli",
            "public-url",
            "--account-id",
            "acc",
            "--bucket",
            "uploads",
            "a/b.png",
        ]);
        assert!(matches!(cli.command, Commands::PublicUrl { ref key, .. } if key == "a/b.png"));
    }

    #[test]
    fn test_check_env_reports_missing_migration_keys() {
        temp_env::with_vars_unset(
            ["CLOUDFLARE_ACCOUNT_ID", "CLOUDFLARE_D1_DATABASE_ID", "CLOUDFLARE_D1_TOKEN"],
            || {
                assert_eq!(report::<MigrationEnv>("migration"), 3);
                assert!(check_env(SchemaName::Migration).is_err());
            },
        );
    }

    #[tokio::test]
    async fn test_local_migrate() {
        migrate(false, Some("sqlite::memory:".to_string()))
            .await
            .unwrap();
    }
}
