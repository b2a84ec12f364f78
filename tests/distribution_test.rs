mod common;

use embedmongo::Error;
use embedmongo::distribution::{self, Arch, DEFAULT_DOWNLOAD_URL, Feature, Os, Platform, versions};

use common::linux_x86;

#[test]
fn test_known_versions_resolve_the_same_way_whatever_the_spelling() {
    let platform = linux_x86();
    let expected = distribution::resolve(Some("2.6.0"), &platform).unwrap();

    for input in ["2.6.0", "v2.6.0", "V2_6_0", " 2.6.0 ", "V2.6.0"] {
        let release = distribution::resolve(Some(input), &platform).unwrap();
        assert_eq!(release, expected, "input {:?}", input);
    }
    assert!(expected.known);
    assert_eq!(expected.version, "2.6.0");
    assert_eq!(expected.product, "mongodb");
}

#[test]
fn test_no_version_means_production() {
    let release = distribution::resolve(None, &linux_x86()).unwrap();
    assert_eq!(release.version, versions::PRODUCTION);
    assert!(release.known);

    let symbolic = distribution::resolve(Some("production"), &linux_x86()).unwrap();
    assert_eq!(symbolic, release);
}

#[test]
fn test_empty_version_is_rejected() {
    for input in ["", "   "] {
        let err = distribution::resolve(Some(input), &linux_x86()).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(_)));
    }
}

#[test]
fn test_release_line_picks_newest_known_patch() {
    let release = distribution::resolve(Some("3.6"), &linux_x86()).unwrap();
    assert_eq!(release.version, "3.6.23");
    assert!(release.known);
}

#[test]
fn test_unknown_versions_degrade_to_generic_release() {
    let release = distribution::resolve(Some("not-a-real-version-99"), &linux_x86()).unwrap();
    assert_eq!(release.version, "not-a-real-version-99");
    assert!(!release.known);
    // Unparseable versions get the newest feature set
    assert!(release.has(Feature::JsonLogs));
    assert!(!release.has(Feature::NoJournal));

    let newer = distribution::resolve(Some("v9.1.0"), &linux_x86()).unwrap();
    assert_eq!(newer.version, "v9.1.0");
    assert_eq!(
        newer.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-9.1.0.tgz"
    );

    let again = distribution::resolve(Some("v9.1.0"), &linux_x86()).unwrap();
    assert_eq!(newer, again);
}

#[test]
fn test_features_follow_release_line() {
    let old = distribution::resolve(Some("3.4"), &linux_x86()).unwrap();
    assert!(old.has(Feature::NoHttpInterfaceArg));
    assert!(old.has(Feature::NoJournal));
    assert!(!old.has(Feature::JsonLogs));

    let new = distribution::resolve(Some("7.0"), &linux_x86()).unwrap();
    assert!(!new.has(Feature::NoHttpInterfaceArg));
    assert!(!new.has(Feature::NoJournal));
    assert!(new.has(Feature::JsonLogs));
    assert!(new.has(Feature::SyncDelay));
}

#[test]
fn test_download_urls_per_platform() {
    let linux = distribution::resolve(Some("2.6.0"), &linux_x86()).unwrap();
    assert_eq!(
        linux.download_url("https://fastdl.mongodb.org/"),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-2.6.0.tgz"
    );

    let ubuntu = linux_x86().with_distribution("ubuntu2204");
    let release = distribution::resolve(Some("7.0"), &ubuntu).unwrap();
    assert_eq!(
        release.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2204-7.0.16.tgz"
    );

    let mac = Platform::new(Os::MacOs, Arch::X86_64);
    assert_eq!(
        distribution::resolve(Some("3.6"), &mac).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/osx/mongodb-osx-x86_64-3.6.23.tgz"
    );
    assert_eq!(
        distribution::resolve(Some("4.4"), &mac).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/osx/mongodb-macos-x86_64-4.4.29.tgz"
    );

    let windows = Platform::new(Os::Windows, Arch::X86_64);
    assert_eq!(
        distribution::resolve(Some("7.0"), &windows).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/windows/mongodb-windows-x86_64-7.0.16.zip"
    );
    assert_eq!(
        distribution::resolve(Some("4.0"), &windows).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/win32/mongodb-win32-x86_64-2008plus-ssl-4.0.28.zip"
    );
}

#[test]
fn test_platforms_without_builds_are_unsupported() {
    let windows_arm = Platform::new(Os::Windows, Arch::Aarch64);
    let err = distribution::resolve(Some("7.0"), &windows_arm).unwrap_err();
    assert!(matches!(err, Error::UnsupportedPlatform { .. }));

    let apple_silicon = Platform::new(Os::MacOs, Arch::Aarch64);
    assert!(matches!(
        distribution::resolve(Some("4.4"), &apple_silicon),
        Err(Error::UnsupportedPlatform { .. })
    ));
    let release = distribution::resolve(Some("7.0"), &apple_silicon).unwrap();
    assert_eq!(
        release.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/osx/mongodb-macos-arm64-7.0.16.tgz"
    );
}

#[test]
fn test_normalize() {
    assert_eq!(distribution::normalize("2.1.1"), "V2_1_1");
    assert_eq!(distribution::normalize("v1.8.2"), "V1_8_2");
    assert_eq!(distribution::normalize("V2_0_4"), "V2_0_4");
    assert_eq!(distribution::normalize("legacy"), "LEGACY");
}

#[test]
fn test_documented_version_spellings_are_known_releases() {
    for (input, version) in [("2.1.1", "2.1.1"), ("v1.8.2", "1.8.2"), ("V2_0_4", "2.0.4"), ("2.4", "2.4.14")] {
        let release = distribution::resolve(Some(input), &linux_x86()).unwrap();
        assert!(release.known, "input {:?}", input);
        assert_eq!(release.version, version);
    }
}

#[test]
fn test_underscore_versions_render_dotted_urls() {
    assert_eq!(
        distribution::resolve(Some("V2_0_4"), &linux_x86()).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-2.0.4.tgz"
    );
    assert_eq!(
        distribution::resolve(Some("2_1_1"), &linux_x86()).unwrap().download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-2.1.1.tgz"
    );

    // Not in the table: the version is echoed but the file name still uses dots
    let unknown = distribution::resolve(Some("V9_1_0"), &linux_x86()).unwrap();
    assert!(!unknown.known);
    assert_eq!(unknown.version, "V9_1_0");
    assert_eq!(
        unknown.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-9.1.0.tgz"
    );
}

#[test]
fn test_linux_distribution_only_applies_to_per_distribution_builds() {
    let ubuntu = linux_x86().with_distribution("ubuntu2204");

    let old = distribution::resolve(Some("3.6"), &ubuntu).unwrap();
    assert_eq!(
        old.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-3.6.23.tgz"
    );

    let new = distribution::resolve(Some("4.2"), &ubuntu).unwrap();
    assert_eq!(
        new.download_url(DEFAULT_DOWNLOAD_URL),
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2204-4.2.25.tgz"
    );
}
