pub mod models;
pub mod versions;

pub use models::{Arch, DEFAULT_DOWNLOAD_URL, Feature, Os, PRODUCT, Platform, ReleaseDescriptor};

use crate::error::{Error, Result};
use models::{features_for, parse_major_minor};

/// Normalize a version token: uppercase, dots to underscores, leading `V`.
pub fn normalize(input: &str) -> String {
    let token = input.trim().to_uppercase().replace('.', "_");
    if versions::symbolic(&token).is_some() || token.starts_with('V') {
        token
    } else {
        format!("V{}", token)
    }
}

/// Resolve a free-form version to a release for `platform`.
///
/// `None` means the production default. Unknown versions are not an error:
/// they resolve to a generic descriptor and a warning is logged.
pub fn resolve(input: Option<&str>, platform: &Platform) -> Result<ReleaseDescriptor> {
    let Some(input) = input else {
        return describe(versions::PRODUCTION, true, platform);
    };
    if input.trim().is_empty() {
        return Err(Error::InvalidVersion("version must not be empty".to_string()));
    }

    let token = normalize(input);
    if let Some(version) = versions::symbolic(&token).or_else(|| versions::lookup(&token)) {
        return describe(version, true, platform);
    }

    tracing::warn!(
        "Unrecognised MongoDB version '{}', this might be a new version that we don't yet know about. Attempting download anyway...",
        input.trim()
    );
    describe(input.trim(), false, platform)
}

fn describe(version: &str, known: bool, platform: &Platform) -> Result<ReleaseDescriptor> {
    // Unparseable versions get the newest feature set
    let (major, minor) = parse_major_minor(version).unwrap_or((u32::MAX, u32::MAX));

    let url_template = url_template(major, minor, platform).ok_or_else(|| Error::UnsupportedPlatform {
        version: version.to_string(),
        platform: platform.to_string(),
    })?;

    if platform.os == Os::Linux && platform.distribution.is_none() && (major, minor) >= (4, 2) {
        tracing::warn!(
            "MongoDB {} is only published per Linux distribution; set EMBEDMONGO_LINUX_DISTRO (e.g. ubuntu2204) if the download fails",
            version
        );
    }

    Ok(ReleaseDescriptor {
        product: PRODUCT,
        version: version.to_string(),
        platform: platform.clone(),
        url_template,
        features: features_for(major, minor),
        known,
    })
}

fn url_template(major: u32, minor: u32, platform: &Platform) -> Option<String> {
    let at_least = |maj: u32, min: u32| (major, minor) >= (maj, min);

    let (dir, name, ext) = match platform.os {
        Os::Linux => ("linux", "linux", "tgz"),
        Os::MacOs if at_least(4, 2) => ("osx", "macos", "tgz"),
        Os::MacOs => ("osx", "osx", "tgz"),
        Os::Windows if at_least(4, 4) => ("windows", "windows", "zip"),
        Os::Windows => ("win32", "win32", "zip"),
    };

    let arch = match (platform.os, platform.arch) {
        (_, Arch::X86_64) => "x86_64",
        (Os::MacOs, Arch::Aarch64) if at_least(6, 0) => "arm64",
        (Os::Linux, Arch::Aarch64) if at_least(3, 4) => "aarch64",
        _ => return None,
    };

    let mut file = format!("mongodb-{}-{}", name, arch);
    // Generic x86_64 Linux tarballs stop at 4.0
    let per_distribution = at_least(4, 2) || platform.arch == Arch::Aarch64;
    if let Some(distribution) = &platform.distribution {
        if platform.os == Os::Linux && per_distribution {
            file.push('-');
            file.push_str(distribution);
        }
    }
    if platform.os == Os::Windows && !at_least(4, 4) {
        file.push_str("-2008plus-ssl");
    }

    Some(format!("{{base}}/{}/{}-{{version}}.{}", dir, file, ext))
}
