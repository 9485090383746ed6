//! Connection setup.

use std::time::Duration;

use mongo_backup_core::{BackupError, Result};
use mongodb::{bson::doc, options::ClientOptions, Client as MongoClient};

use crate::store::{classify, MongoStore};

/// Connection options (library type without clap)
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    pub uri: String,
    /// Database to use when the URI does not name one
    pub database: Option<String>,
    pub connect_timeout: Duration,
}

impl ConnectOpts {
    pub fn new(uri: impl Into<String>, database: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            database,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connect to MongoDB and verify the server answers a ping.
///
/// The database is the one named in the URI path, falling back to
/// `opts.database`.
pub async fn connect(opts: &ConnectOpts) -> Result<MongoStore> {
    tracing::debug!("Parsing MongoDB connection options");
    let mut mongo_options = match ClientOptions::parse(&opts.uri).await {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("Failed to parse MongoDB connection options: {}", e);
            return Err(BackupError::Connection(format!(
                "invalid connection string: {e}"
            )));
        }
    };
    // Fail fast instead of hanging on an unreachable server
    mongo_options.connect_timeout = Some(opts.connect_timeout);
    mongo_options.server_selection_timeout = Some(opts.connect_timeout);

    let db_name = mongo_options
        .default_database
        .clone()
        .or_else(|| opts.database.clone())
        .ok_or_else(|| {
            BackupError::Connection(
                "no database in connection string and no database name given".to_string(),
            )
        })?;

    let client = MongoClient::with_options(mongo_options)
        .map_err(|e| BackupError::Connection(e.to_string()))?;
    let database = client.database(&db_name);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| match classify(e, "<ping>") {
            BackupError::Query { reason, .. } => BackupError::Connection(reason),
            other => other,
        })?;
    tracing::info!("Connected to MongoDB database '{}'", db_name);

    Ok(MongoStore::new(client, database))
}
