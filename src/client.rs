use std::time::Duration;

use mongodb::{Client, bson::doc};
use serde::Serialize;

use crate::error::Result;

/// A database and the collections to create in it after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedCollection {
    pub db_name: String,
    pub collection_names: Vec<String>,
}

impl EmbeddedCollection {
    pub fn new<I, S>(db_name: &str, collection_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            db_name: db_name.to_string(),
            collection_names: collection_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// `mongodb://` URI for a single directly-connected server.
pub fn connection_string(host: &str, port: u16) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    format!("mongodb://{}:{}/?directConnection=true", host, port)
}

/// Create a client for the launched server and ping it.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Client> {
    let uri = format!(
        "{}&serverSelectionTimeoutMS={}&appName=embedmongo",
        connection_string(host, port),
        timeout.as_millis()
    );
    let client = Client::with_uri_str(&uri).await?;

    // Ping to verify connection
    client.database("admin").run_command(doc! {"ping": 1}).await?;

    tracing::info!("Successfully connected to embedded MongoDB at {}:{}", host, port);
    Ok(client)
}

/// Create the configured collections, one at a time.
///
/// Failures are logged and skipped; returns how many collections were created.
pub async fn create_collections(client: &Client, collections: &[EmbeddedCollection]) -> usize {
    let mut created = 0;
    for collection in collections {
        let db = client.database(&collection.db_name);
        for name in &collection.collection_names {
            match db.create_collection(name).await {
                Ok(()) => {
                    tracing::debug!("Created collection {}.{}", collection.db_name, name);
                    created += 1;
                }
                Err(e) => {
                    tracing::warn!("Could not create collection {}.{}: {}", collection.db_name, name, e);
                }
            }
        }
    }
    created
}
