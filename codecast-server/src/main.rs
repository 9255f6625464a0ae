use std::{env, sync::Arc};

use codecast_core::{ConfigError, ProviderConfig, RandomUidGenerator, TokenIssuer};
use codecast_live::{DatabaseError, Live, PgDatabase};
use codecast_server::{logging, run_server};
use colored::Colorize;
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("CODECAST_DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("Could not initialize database: {0}")]
    Database(DatabaseError),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::Config(_) | StartupError::MissingDatabaseUrl => {
                "Set the missing environment variable and start the server again.".to_string()
            }
            StartupError::Database(_) => {
                "This is a database error. Make sure the postgres instance is running and reachable, then try again."
                    .to_string()
            }
        }
    }
}

async fn init() -> Result<Arc<Live>, StartupError> {
    let provider_config = ProviderConfig::from_env()?;

    let database_url =
        env::var("CODECAST_DATABASE_URL").map_err(|_| StartupError::MissingDatabaseUrl)?;

    info!("Connecting to database...");

    let database = PgDatabase::new(&database_url)
        .await
        .map_err(StartupError::Database)?;

    info!("Initialized successfully.");

    Ok(Arc::new(Live::new(
        Arc::new(database),
        TokenIssuer::new(provider_config),
        Arc::new(RandomUidGenerator),
    )))
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    match init().await {
        Ok(live) => run_server(live).await,
        Err(startup_error) => {
            error!(
                "{} Read the error below to troubleshoot the issue.",
                "codecast failed to start!".bold().red()
            );
            error!("{startup_error}");
            error!("{}", format!("Hint: {}", startup_error.hint()).italic());
        }
    }
}
