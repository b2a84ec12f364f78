use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

pub const PRODUCT: &str = "mongodb";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://fastdl.mongodb.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Operating system and CPU architecture a release is built for.
///
/// Linux builds from 4.2 on are published per distribution (`ubuntu2204`,
/// `rhel80`, ...), which is carried in `distribution`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
    pub distribution: Option<String>,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self {
            os,
            arch,
            distribution: None,
        }
    }

    pub fn with_distribution(mut self, distribution: impl Into<String>) -> Self {
        let distribution = distribution.into();
        self.distribution = (!distribution.trim().is_empty()).then(|| distribution.trim().to_string());
        self
    }

    /// Detect the platform of the running host.
    ///
    /// On Linux the distribution is read from `/etc/os-release` when it names
    /// one MongoDB publishes builds for.
    pub fn detect() -> Result<Self> {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            other => {
                return Err(Error::UnsupportedPlatform {
                    version: "any".to_string(),
                    platform: format!("{}-{}", other, std::env::consts::ARCH),
                });
            }
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => {
                return Err(Error::UnsupportedPlatform {
                    version: "any".to_string(),
                    platform: format!("{}-{}", std::env::consts::OS, other),
                });
            }
        };
        let platform = Self::new(os, arch);
        if os == Os::Linux {
            if let Some(distribution) = detect_linux_distribution() {
                return Ok(platform.with_distribution(distribution));
            }
        }
        Ok(platform)
    }

    pub fn executable_name(&self) -> &'static str {
        match self.os {
            Os::Windows => "mongod.exe",
            _ => "mongod",
        }
    }
}

const OS_RELEASE: &str = "/etc/os-release";

fn detect_linux_distribution() -> Option<String> {
    let contents = match std::fs::read_to_string(OS_RELEASE) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::debug!("Could not read {}: {}", OS_RELEASE, e);
            return None;
        }
    };
    let distribution = distribution_from_os_release(&contents);
    match &distribution {
        Some(distribution) => tracing::debug!("Detected Linux distribution {}", distribution),
        None => tracing::warn!(
            "Unrecognised Linux distribution in {}, set EMBEDMONGO_LINUX_DISTRO to pick a MongoDB build",
            OS_RELEASE
        ),
    }
    distribution
}

/// Map the contents of `/etc/os-release` to a MongoDB build name such as
/// `ubuntu2204`, `debian12` or `rhel80`.
pub fn distribution_from_os_release(contents: &str) -> Option<String> {
    let mut id = None;
    let mut version_id = None;
    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(['"', '\'']);
        match key.trim() {
            "ID" => id = Some(value.to_lowercase()),
            "VERSION_ID" => version_id = Some(value.to_string()),
            _ => {}
        }
    }

    let (id, version_id) = (id?, version_id?);
    let major = version_id
        .split('.')
        .next()
        .filter(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()))?;

    match id.as_str() {
        "ubuntu" => Some(format!("ubuntu{}", version_id.replace('.', ""))),
        "debian" => Some(format!("debian{}", major)),
        "rhel" | "centos" | "rocky" | "almalinux" | "ol" => Some(format!("rhel{}0", major)),
        "amzn" if major == "2" || major == "2023" => Some(format!("amazon{}", major)),
        "sles" | "opensuse-leap" => Some(format!("suse{}", major)),
        _ => None,
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let os = match self.os {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
        };
        let arch = match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        };
        match &self.distribution {
            Some(distribution) => write!(f, "{}-{}-{}", os, arch, distribution),
            None => write!(f, "{}-{}", os, arch),
        }
    }
}

/// Release capabilities that change how `mongod` has to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Feature {
    /// `--syncdelay=0` is accepted.
    SyncDelay,
    /// The HTTP status interface exists and is turned off with `--nohttpinterface`.
    NoHttpInterfaceArg,
    /// `--nojournal` is accepted (removed in 6.1).
    NoJournal,
    /// Log lines are structured JSON (4.4+).
    JsonLogs,
}

/// Feature set for a `major.minor` release line.
pub fn features_for(major: u32, minor: u32) -> Vec<Feature> {
    let at_least = |maj: u32, min: u32| (major, minor) >= (maj, min);

    let mut features = vec![Feature::SyncDelay];
    if at_least(2, 6) && !at_least(3, 6) {
        features.push(Feature::NoHttpInterfaceArg);
    }
    if !at_least(6, 1) {
        features.push(Feature::NoJournal);
    }
    if at_least(4, 4) {
        features.push(Feature::JsonLogs);
    }
    features
}

/// Leading `major.minor` of a version string, ignoring a `v` prefix.
pub fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let trimmed = version.trim().trim_start_matches(['v', 'V']);
    let mut parts = trimmed.split(['.', '_']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()
        .map(|m| {
            let digits: String = m.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .unwrap_or(Some(0))?;
    Some((major, minor))
}

/// A resolved, platform-qualified MongoDB release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseDescriptor {
    pub product: &'static str,
    pub version: String,
    pub platform: Platform,
    pub url_template: String,
    pub features: Vec<Feature>,
    /// Whether the version came from the table of known releases.
    pub known: bool,
}

impl ReleaseDescriptor {
    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Version as it appears in download file names: no `v` prefix, dot separated.
    pub fn download_version(&self) -> String {
        let v = self.version.trim();
        let v = match v.strip_prefix(['v', 'V']) {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
            _ => v,
        };
        v.replace('_', ".")
    }

    /// Render the download URL against a base such as `https://fastdl.mongodb.org`.
    pub fn download_url(&self, base_url: &str) -> String {
        self.url_template
            .replace("{base}", base_url.trim_end_matches('/'))
            .replace("{version}", &self.download_version())
    }
}
