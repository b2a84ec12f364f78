/// Known releases, oldest first. Keys are normalized `V<major>_<minor>_<patch>` tokens.
pub const KNOWN_RELEASES: &[(&str, &str)] = &[
    ("V1_6_5", "1.6.5"),
    ("V1_7_6", "1.7.6"),
    ("V1_8_0", "1.8.0"),
    ("V1_8_1", "1.8.1"),
    ("V1_8_2", "1.8.2"),
    ("V1_8_4", "1.8.4"),
    ("V1_8_5", "1.8.5"),
    ("V1_9_0", "1.9.0"),
    ("V2_0_1", "2.0.1"),
    ("V2_0_4", "2.0.4"),
    ("V2_0_5", "2.0.5"),
    ("V2_0_6", "2.0.6"),
    ("V2_0_7", "2.0.7"),
    ("V2_0_9", "2.0.9"),
    ("V2_1_0", "2.1.0"),
    ("V2_1_1", "2.1.1"),
    ("V2_1_2", "2.1.2"),
    ("V2_2_0", "2.2.0"),
    ("V2_2_1", "2.2.1"),
    ("V2_2_7", "2.2.7"),
    ("V2_3_0", "2.3.0"),
    ("V2_4_0", "2.4.0"),
    ("V2_4_5", "2.4.5"),
    ("V2_4_9", "2.4.9"),
    ("V2_4_10", "2.4.10"),
    ("V2_4_14", "2.4.14"),
    ("V2_6_0", "2.6.0"),
    ("V2_6_12", "2.6.12"),
    ("V3_0_15", "3.0.15"),
    ("V3_2_22", "3.2.22"),
    ("V3_4_24", "3.4.24"),
    ("V3_6_23", "3.6.23"),
    ("V4_0_28", "4.0.28"),
    ("V4_2_25", "4.2.25"),
    ("V4_4_29", "4.4.29"),
    ("V5_0_31", "5.0.31"),
    ("V6_0_20", "6.0.20"),
    ("V7_0_16", "7.0.16"),
    ("V8_0_4", "8.0.4"),
];

pub const PRODUCTION: &str = "7.0.16";
pub const DEVELOPMENT: &str = "8.0.4";
pub const LEGACY: &str = "4.4.29";

/// Symbolic release names.
pub fn symbolic(token: &str) -> Option<&'static str> {
    match token {
        "PRODUCTION" => Some(PRODUCTION),
        "DEVELOPMENT" => Some(DEVELOPMENT),
        "LEGACY" => Some(LEGACY),
        _ => None,
    }
}

/// Look up a normalized token. `V<major>_<minor>` picks the newest known patch of that line.
pub fn lookup(token: &str) -> Option<&'static str> {
    if let Some((_, version)) = KNOWN_RELEASES.iter().find(|(key, _)| *key == token) {
        return Some(version);
    }

    let line_prefix = format!("{}_", token);
    KNOWN_RELEASES
        .iter()
        .rev()
        .find(|(key, _)| key.starts_with(&line_prefix) && key[line_prefix.len()..].chars().all(|c| c.is_ascii_digit()))
        .map(|(_, version)| *version)
}
