pub mod output;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{DEFAULT_STARTUP_TIMEOUT, MongodConfig};
use crate::distribution::{Feature, ReleaseDescriptor};
use crate::error::{Error, Result};
use crate::net::NetworkOptions;
use crate::store::CachedArtifact;
use output::{OutputTail, ProcessOutput, Stream, spawn_reader};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// A TCP probe only counts as readiness after this long, so a foreign
/// listener on the port is not mistaken for our server before it fails to bind.
const PROBE_AFTER: Duration = Duration::from_secs(2);
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "code")]
pub enum ProcessState {
    Starting,
    Running,
    Stopped,
    Exited(Option<i32>),
}

/// Settings for a single launch.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub network: NetworkOptions,
    pub data_dir: Option<PathBuf>,
    pub startup_timeout: Duration,
    pub output: ProcessOutput,
}

impl LaunchOptions {
    pub fn new(network: NetworkOptions) -> Self {
        Self {
            network,
            data_dir: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            output: ProcessOutput::default(),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &MongodConfig, network: NetworkOptions) -> Self {
        Self {
            network,
            data_dir: config.data_dir().map(Path::to_path_buf),
            startup_timeout: config.startup_timeout(),
            output: *config.output(),
        }
    }
}

#[derive(Debug)]
enum DataDir {
    Temporary(TempDir),
    Configured(PathBuf),
}

impl DataDir {
    fn path(&self) -> &Path {
        match self {
            DataDir::Temporary(dir) => dir.path(),
            DataDir::Configured(dir) => dir,
        }
    }
}

/// A launched `mongod`. Dropping the handle kills the process.
#[derive(Debug)]
pub struct ProcessHandle {
    id: Uuid,
    pid: Option<u32>,
    address: String,
    port: u16,
    state: ProcessState,
    started_at: DateTime<Utc>,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    data_dir: Option<DataDir>,
}

impl ProcessHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_ref().map(DataDir::path)
    }

    /// Current state, noticing a process that exited on its own.
    pub fn state(&mut self) -> ProcessState {
        if self.state == ProcessState::Running {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    tracing::warn!("mongod (pid {:?}) exited unexpectedly with {}", self.pid, status);
                    self.state = ProcessState::Exited(status.code());
                    self.child = None;
                }
            }
        }
        self.state
    }

    /// Stop the process: SIGTERM, then a forced kill after `grace`.
    ///
    /// Calling this again, or after the process already exited, does nothing.
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            self.cleanup().await;
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            tracing::debug!("mongod (pid {:?}) had already exited with {}", self.pid, status);
            self.state = ProcessState::Exited(status.code());
        } else {
            terminate(&mut child);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    tracing::debug!("mongod (pid {:?}) exited with {}", self.pid, status);
                }
                Err(_) => {
                    tracing::warn!(
                        "mongod (pid {:?}) did not stop within {:?}, killing it",
                        self.pid,
                        grace
                    );
                    child.kill().await?;
                }
            }
            self.state = ProcessState::Stopped;
        }

        self.cleanup().await;
        Ok(())
    }

    async fn cleanup(&mut self) {
        for reader in self.readers.drain(..) {
            if tokio::time::timeout(READER_JOIN_TIMEOUT, reader).await.is_err() {
                tracing::debug!("mongod output reader did not finish in time");
            }
        }
        if let Some(DataDir::Temporary(dir)) = self.data_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("Could not remove data directory {}: {}", path.display(), e);
            }
        }
    }
}

/// Launch `artifact` and wait until it accepts connections.
pub async fn start(artifact: &CachedArtifact, options: &LaunchOptions) -> Result<ProcessHandle> {
    let port = options.network.resolve_port()?;
    let address = options.network.bind_ip().to_string();

    let data_dir = match &options.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            DataDir::Configured(dir.clone())
        }
        None => DataDir::Temporary(tempfile::Builder::new().prefix("embedmongo-").tempdir()?),
    };

    let args = build_args(&artifact.release, &options.network, port, data_dir.path());
    output::log_command(
        &options.output,
        &format!("Starting {} {}", artifact.path.display(), args.join(" ")),
    );

    let mut child = Command::new(&artifact.path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            path: artifact.path.clone(),
            source,
        })?;

    let pid = child.id();
    let tail = OutputTail::default();
    let (ready_tx, ready_rx) = watch::channel(false);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, options.output, tail.clone(), Some(ready_tx)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, options.output, tail.clone(), None));
    }

    let mut handle = ProcessHandle {
        id: Uuid::new_v4(),
        pid,
        address,
        port,
        state: ProcessState::Starting,
        started_at: Utc::now(),
        child: Some(child),
        readers,
        data_dir: Some(data_dir),
    };

    let probe_addr = SocketAddr::new(options.network.connect_ip(), port);
    let outcome = match handle.child.as_mut() {
        Some(child) => wait_ready(child, ready_rx, probe_addr, options.startup_timeout).await,
        None => Ok(Readiness::TimedOut),
    };

    match outcome {
        Ok(Readiness::Ready) => {
            handle.state = ProcessState::Running;
            output::log_command(
                &options.output,
                &format!("mongod {} ready on {}:{} (pid {:?})", artifact.release.version, handle.address, port, pid),
            );
            Ok(handle)
        }
        Ok(Readiness::Exited(status)) => {
            handle.state = ProcessState::Exited(status.code());
            handle.child = None;
            handle.cleanup().await;
            Err(Error::ProcessExitedUnexpectedly {
                status: status.to_string(),
                output: tail.lines(),
            })
        }
        Ok(Readiness::TimedOut) => {
            tracing::error!("mongod (pid {:?}) not ready after {:?}, killing it", pid, options.startup_timeout);
            if let Some(mut child) = handle.child.take() {
                child.kill().await?;
            }
            handle.state = ProcessState::Stopped;
            handle.cleanup().await;
            Err(Error::StartupTimeout(options.startup_timeout))
        }
        Err(e) => {
            if let Some(mut child) = handle.child.take() {
                let _ = child.kill().await;
            }
            handle.cleanup().await;
            Err(e)
        }
    }
}

enum Readiness {
    Ready,
    Exited(ExitStatus),
    TimedOut,
}

async fn wait_ready(
    child: &mut Child,
    mut ready: watch::Receiver<bool>,
    probe_addr: SocketAddr,
    timeout: Duration,
) -> Result<Readiness> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut stdout_open = true;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Readiness::Exited(status));
        }
        if *ready.borrow() {
            return Ok(Readiness::Ready);
        }
        if started.elapsed() >= PROBE_AFTER && probe(probe_addr).await {
            // The listener may belong to a process that lost the port race
            if child.try_wait()?.is_none() {
                return Ok(Readiness::Ready);
            }
        }
        if Instant::now() >= deadline {
            return Ok(Readiness::TimedOut);
        }

        tokio::select! {
            changed = ready.changed(), if stdout_open => {
                if changed.is_err() {
                    stdout_open = false;
                }
            }
            _ = tokio::time::sleep_until(deadline.min(Instant::now() + POLL_INTERVAL)) => {}
        }
    }
}

async fn probe(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(POLL_INTERVAL, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Command line for `mongod`.
pub fn build_args(release: &ReleaseDescriptor, network: &NetworkOptions, port: u16, data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--port".to_string(),
        port.to_string(),
        "--bind_ip".to_string(),
        network.bind_ip().to_string(),
        "--dbpath".to_string(),
        data_dir.display().to_string(),
    ];
    if network.is_ipv6() {
        args.push("--ipv6".to_string());
    }
    if cfg!(unix) {
        args.push("--nounixsocket".to_string());
    }
    if release.has(Feature::SyncDelay) {
        args.push("--syncdelay=0".to_string());
    }
    if release.has(Feature::NoHttpInterfaceArg) {
        args.push("--nohttpinterface".to_string());
    }
    if release.has(Feature::NoJournal) {
        args.push("--nojournal".to_string());
    }
    args
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet.
    let sent = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if sent != 0 {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
