#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use embedmongo::distribution::{self, Arch, Os, Platform, ReleaseDescriptor};
use embedmongo::{ArtifactStore, CachedArtifact};

pub const ARTIFACT_PATH: &str = "/linux/mongodb-linux-x86_64-2.6.0.tgz";

pub fn linux_x86() -> Platform {
    Platform::new(Os::Linux, Arch::X86_64)
}

pub fn release(version: &str) -> ReleaseDescriptor {
    distribution::resolve(Some(version), &linux_x86()).unwrap()
}

/// Fake mongod that announces readiness and then idles.
pub fn ready_script(pid_file: &Path) -> String {
    format!(
        "#!/bin/sh\necho $$ > '{}'\necho \"MongoDB starting : $*\"\necho \"[initandlisten] waiting for connections on port $2\"\nexec sleep 30\n",
        pid_file.display()
    )
}

/// Fake mongod that never becomes ready.
pub fn hanging_script(pid_file: &Path) -> String {
    format!(
        "#!/bin/sh\necho $$ > '{}'\necho \"MongoDB starting\"\nexec sleep 30\n",
        pid_file.display()
    )
}

/// Fake mongod that fails to bind its port.
pub fn crashing_script() -> String {
    "#!/bin/sh\necho \"ERROR: listen(): bind() failed errno:98 Address already in use\" >&2\nexit 48\n".to_string()
}

#[cfg(unix)]
pub fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Artifact pointing at a script outside any cache.
#[cfg(unix)]
pub fn script_artifact(dir: &Path, version: &str, contents: &str) -> CachedArtifact {
    let path = dir.join("mongod");
    write_executable(&path, contents);
    CachedArtifact {
        release: release(version),
        path,
        executable: true,
        sha256: String::new(),
    }
}

/// Put a script where the store expects the binary for `version`.
#[cfg(unix)]
pub fn seed_cache(cache_dir: &Path, version: &str, contents: &str) -> PathBuf {
    let store = ArtifactStore::new(cache_dir, "http://127.0.0.1:9");
    let path = store.artifact_path(&release(version));
    write_executable(&path, contents);
    path
}

pub fn read_pid(pid_file: &Path) -> i32 {
    std::fs::read_to_string(pid_file).unwrap().trim().parse().unwrap()
}

#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Local stand-in for the download host.
pub struct FakeDownloadServer {
    pub base_url: String,
    pub requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeDownloadServer {
    /// Serve `body` at `path`, and `checksum` at `path.sha256` when given.
    pub async fn start(path: &str, body: Vec<u8>, checksum: Option<String>) -> Self {
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&requests);
        let mut app = Router::new().route(
            path,
            get(move || {
                let body = body.clone();
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    body
                }
            }),
        );

        let checksum_path = format!("{}.sha256", path);
        app = match checksum {
            Some(checksum) => app.route(
                &checksum_path,
                get(move || {
                    let checksum = checksum.clone();
                    async move { format!("{}  mongodb-linux-x86_64-2.6.0.tgz\n", checksum) }
                }),
            ),
            None => app.route(&checksum_path, get(|| async { StatusCode::NOT_FOUND })),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            task,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop serving; later downloads fail to connect.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
