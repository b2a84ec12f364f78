//! Download, launch and tear down a throwaway MongoDB server for tests and
//! local development.
//!
//! `embedmongo` is not an embedded database: it fetches an official `mongod`
//! build for the host platform, caches it, runs it as a child process and
//! hands back a connected [`mongodb::Client`].
//!
//! ```no_run
//! use embedmongo::{EmbeddedMongo, MongodConfig};
//!
//! # async fn run() -> embedmongo::Result<()> {
//! let mongo = EmbeddedMongo::new(MongodConfig::new().with_version("7.0")?);
//! let client = mongo.acquire().await?;
//! client.database("test").create_collection("things").await?;
//! mongo.release().await;
//! # Ok(())
//! # }
//! ```
//!
//! Log output is emitted through `tracing`. Useful targets:
//!
//! - `embedmongo::process::output` for the server's own output
//! - `embedmongo::store::progress` for download progress
//! - `embedmongo::embedded` for lifecycle events

pub mod client;
pub mod config;
pub mod distribution;
pub mod embedded;
pub mod error;
pub mod health;
pub mod net;
pub mod process;
pub mod store;

pub use client::EmbeddedCollection;
pub use config::MongodConfig;
pub use distribution::{Platform, ReleaseDescriptor};
pub use embedded::{EmbeddedMongo, InstanceStatus, LifecycleState};
pub use error::{Error, Result};
pub use net::NetworkOptions;
pub use process::{ProcessHandle, ProcessState};
pub use store::progress::{ProgressListener, TracingProgressListener};
pub use store::{ArtifactStore, CachedArtifact};
