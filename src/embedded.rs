use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mongodb::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client;
use crate::config::MongodConfig;
use crate::distribution::{self, ReleaseDescriptor};
use crate::error::{Error, Result};
use crate::net::NetworkOptions;
use crate::process::{self, LaunchOptions, ProcessHandle, ProcessState};
use crate::store::ArtifactStore;
use crate::store::progress::ProgressListener;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// Snapshot of the managed instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub state: LifecycleState,
    pub instance_id: Option<Uuid>,
    pub version: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub process: Option<ProcessState>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
}

struct Instance {
    release: ReleaseDescriptor,
    process: ProcessHandle,
    client: Client,
}

struct Inner {
    state: LifecycleState,
    instance: Option<Instance>,
}

/// Runs one `mongod` for a test suite or dev session.
///
/// Call [`acquire`](Self::acquire) once at setup and [`release`](Self::release)
/// once at teardown. Only one instance can be running at a time.
pub struct EmbeddedMongo {
    config: MongodConfig,
    store: ArtifactStore,
    inner: Mutex<Inner>,
}

impl EmbeddedMongo {
    pub fn new(config: MongodConfig) -> Self {
        let store = ArtifactStore::new(config.cache_dir(), config.download_url())
            .with_verify_checksum(config.verify_checksum());
        Self {
            config,
            store,
            inner: Mutex::new(Inner {
                state: LifecycleState::Idle,
                instance: None,
            }),
        }
    }

    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.store = self.store.with_listener(listener);
        self
    }

    pub fn config(&self) -> &MongodConfig {
        &self.config
    }

    /// Start the configured version and network, returning a connected client.
    pub async fn acquire(&self) -> Result<Client> {
        self.acquire_with(self.config.version(), self.config.network().clone())
            .await
    }

    /// Start `version` (or the production default) on `network`.
    ///
    /// Fails with [`Error::AlreadyRunning`] while a previous instance is running.
    /// An instance whose `mongod` exited on its own is cleaned up and replaced.
    pub async fn acquire_with(&self, version: Option<&str>, network: NetworkOptions) -> Result<Client> {
        let mut inner = self.inner.lock().await;

        if inner.state == LifecycleState::Running {
            let (address, port, exited) = match inner.instance.as_mut() {
                Some(instance) => (
                    instance.process.address().to_string(),
                    instance.process.port(),
                    matches!(instance.process.state(), ProcessState::Exited(_)),
                ),
                None => (network.bind_ip().to_string(), 0, false),
            };
            if !exited {
                return Err(Error::AlreadyRunning { address, port });
            }

            tracing::warn!(
                "Embedded MongoDB on {}:{} exited on its own, starting a new instance",
                address,
                port
            );
            if let Some(instance) = inner.instance.take() {
                self.shutdown(instance).await;
            }
        }

        inner.state = LifecycleState::Starting;
        match self.launch(version, network).await {
            Ok(instance) => {
                let client = instance.client.clone();
                inner.instance = Some(instance);
                inner.state = LifecycleState::Running;
                Ok(client)
            }
            Err(e) => {
                tracing::error!("Could not start embedded MongoDB: {}", e);
                inner.state = LifecycleState::Idle;
                Err(e)
            }
        }
    }

    async fn launch(&self, version: Option<&str>, network: NetworkOptions) -> Result<Instance> {
        tracing::info!("Initializing embedded MongoDB instance");
        let platform = self.config.platform()?;
        let release = distribution::resolve(version, &platform)?;
        let artifact = self.store.ensure(&release).await?;

        tracing::info!("Starting embedded MongoDB instance");
        let connect_ip = network.connect_ip().to_string();
        let options = LaunchOptions::from_config(&self.config, network);
        let mut process = process::start(&artifact, &options).await?;

        let client = match client::connect(&connect_ip, process.port(), CONNECT_TIMEOUT).await {
            Ok(client) => client,
            Err(e) => {
                // Never leave a started server behind
                if let Err(stop_err) = process.stop(self.config.shutdown_grace()).await {
                    tracing::warn!("Could not stop mongod after failed connect: {}", stop_err);
                }
                return Err(e);
            }
        };

        let collections = self.config.collections();
        if !collections.is_empty() {
            let created = client::create_collections(&client, collections).await;
            tracing::info!("Created {} collection(s) in embedded MongoDB", created);
        }

        Ok(Instance {
            release,
            process,
            client,
        })
    }

    /// Close the client, then stop the server. Never fails; problems are logged.
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        let Some(instance) = inner.instance.take() else {
            return;
        };

        tracing::info!("Stopping embedded MongoDB instance");
        self.shutdown(instance).await;
        inner.state = LifecycleState::Stopped;
    }

    async fn shutdown(&self, mut instance: Instance) {
        instance.client.shutdown().immediate(true).await;

        if let Err(e) = instance.process.stop(self.config.shutdown_grace()).await {
            tracing::error!("Failed to stop embedded MongoDB (pid {:?}): {}", instance.process.pid(), e);
        }
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    /// `mongodb://` URI of the running instance.
    pub async fn connection_string(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.instance.as_ref().map(|instance| {
            let host = match instance.process.address() {
                "0.0.0.0" => "127.0.0.1",
                "::" => "::1",
                other => other,
            };
            client::connection_string(host, instance.process.port())
        })
    }

    pub async fn status(&self) -> InstanceStatus {
        let mut inner = self.inner.lock().await;
        let state = inner.state;
        match inner.instance.as_mut() {
            Some(instance) => {
                let started_at = instance.process.started_at();
                InstanceStatus {
                    state,
                    instance_id: Some(instance.process.id()),
                    version: Some(instance.release.version.clone()),
                    address: Some(instance.process.address().to_string()),
                    port: Some(instance.process.port()),
                    pid: instance.process.pid(),
                    process: Some(instance.process.state()),
                    started_at: Some(started_at),
                    uptime_secs: Some((Utc::now() - started_at).num_seconds()),
                }
            }
            None => InstanceStatus {
                state,
                instance_id: None,
                version: None,
                address: None,
                port: None,
                pid: None,
                process: None,
                started_at: None,
                uptime_secs: None,
            },
        }
    }
}
