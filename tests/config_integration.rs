//! Integration tests for patch profiles
//!
//! Tests profile parsing, validation and descriptor generation

use res_patcher::config::{
    load_from_path, load_from_str, ConfigError, Field, Resolution, ValidationIssue,
};
use res_patcher::{ApplyMode, Outcome, PatchEngine};
use std::fs;
use tempfile::TempDir;

const BASE: &str = r#"
[meta]
name = "test-build"
executable = "game.exe"

[resolution]
original = { width = 3840, height = 2160 }
target = { width = 5120, height = 2880 }
"#;

fn profile_with(body: &str) -> String {
    format!("{BASE}\n{body}")
}

fn validation_issues(
    result: Result<res_patcher::PatchProfile, ConfigError>,
) -> Vec<ValidationIssue> {
    match result {
        Err(ConfigError::Validation { source, .. }) => source.issues,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_load_profile_basic() {
    let toml = profile_with(
        r#"
[[sites]]
id = "table-width"
offset = 0x10
field = "width"
description = "Resolution table (width)"

[[sites]]
id = "table-height"
offset = 0x14
field = "height"
"#,
    );

    let profile = load_from_str(&toml).expect("Failed to parse profile");

    assert_eq!(profile.name(), "test-build");
    assert_eq!(profile.sites.len(), 2);
    assert_eq!(profile.sites[0].offset, 0x10);
    assert_eq!(profile.sites[1].field, Field::Height);
    assert!(profile.userconfig.is_none());

    let descriptors = profile.descriptors(Resolution::new(7680, 4320)).unwrap();
    assert_eq!(descriptors[0].description(), "Resolution table (width)");
    // Missing description falls back to the id
    assert_eq!(descriptors[1].description(), "table-height");
    assert_eq!(descriptors[1].replacement(), &4320u32.to_le_bytes());
}

#[test]
fn test_raw_patches_follow_sites() {
    let toml = profile_with(
        r#"
[[sites]]
id = "table-width"
offset = 0x10
field = "width"

[[raw]]
id = "aspect-check"
offset = 0x40
expected = "74 05"
replacement = "EB 05"
description = "jz -> jmp"
"#,
    );

    let profile = load_from_str(&toml).unwrap();
    let descriptors = profile.descriptors(profile.resolution.target).unwrap();

    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[1].offset(), 0x40);
    assert_eq!(descriptors[1].expected(), &[0x74, 0x05]);
    assert_eq!(descriptors[1].replacement(), &[0xEB, 0x05]);
}

#[test]
fn test_raw_length_mismatch_rejected_at_load() {
    let toml = profile_with(
        r#"
[[raw]]
id = "bad"
offset = 0
expected = "40 0F 00 00"
replacement = "00 14"
"#,
    );

    let issues = validation_issues(load_from_str(&toml));
    assert!(issues.iter().any(|issue| matches!(
        issue,
        ValidationIssue::MalformedRaw { site_id, .. } if site_id == "bad"
    )));
}

#[test]
fn test_raw_bad_hex_rejected() {
    let toml = profile_with(
        r#"
[[raw]]
id = "bad-hex"
offset = 0
expected = "ZZ"
replacement = "00"
"#,
    );

    let issues = validation_issues(load_from_str(&toml));
    assert!(matches!(issues[0], ValidationIssue::MalformedRaw { .. }));
}

#[test]
fn test_empty_profile_rejected() {
    let issues = validation_issues(load_from_str(BASE));
    assert!(issues.contains(&ValidationIssue::EmptySiteList));
}

#[test]
fn test_duplicate_and_overlapping_sites_rejected() {
    let toml = profile_with(
        r#"
[[sites]]
id = "a"
offset = 0x10
field = "width"

[[sites]]
id = "a"
offset = 0x12
field = "height"
"#,
    );

    let issues = validation_issues(load_from_str(&toml));
    assert!(issues.contains(&ValidationIssue::DuplicateId("a".to_string())));
    assert!(issues
        .iter()
        .any(|issue| matches!(issue, ValidationIssue::Overlap { .. })));
}

#[test]
fn test_blank_ids_reported_with_position() {
    let toml = profile_with(
        r#"
[[sites]]
id = "w"
offset = 0
field = "width"

[[sites]]
id = " "
offset = 8
field = "height"

[[raw]]
id = ""
offset = 16
expected = "74 05"
replacement = "EB 05"
"#,
    );

    let issues = validation_issues(load_from_str(&toml));
    assert!(issues.contains(&ValidationIssue::EmptyId {
        section: "sites",
        index: 1
    }));
    assert!(issues.contains(&ValidationIssue::EmptyId {
        section: "raw",
        index: 0
    }));
    assert!(issues
        .iter()
        .any(|issue| issue.to_string() == "sites[1] has an empty id"));
}

#[test]
fn test_zero_resolution_rejected() {
    let toml = r#"
[resolution]
original = { width = 3840, height = 2160 }
target = { width = 0, height = 2880 }

[[sites]]
id = "w"
offset = 0
field = "width"
"#;

    let issues = validation_issues(load_from_str(toml));
    assert!(issues
        .iter()
        .any(|issue| matches!(issue, ValidationIssue::ZeroDimension { .. })));
}

#[test]
fn test_unknown_field_kind_is_parse_error() {
    let toml = profile_with(
        r#"
[[sites]]
id = "w"
offset = 0
field = "depth"
"#,
    );

    assert!(matches!(load_from_str(&toml), Err(ConfigError::Toml { .. })));
}

#[test]
fn test_load_from_path_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, BASE).unwrap();

    let err = load_from_path(&path).unwrap_err();

    assert!(err.to_string().contains("broken.toml"));
    assert!(err.to_string().contains("no sites"));
}

#[test]
fn test_builtin_profile_patches_matching_image() {
    let profile = res_patcher::builtin().unwrap();
    let descriptors = profile.descriptors(profile.resolution.target).unwrap();

    let mut image = vec![0u8; 0xBDA500];
    for descriptor in &descriptors {
        let offset = descriptor.offset();
        image[offset..offset + descriptor.len()].copy_from_slice(descriptor.expected());
    }

    let engine = PatchEngine::new(descriptors);
    let plan = engine.plan(&image);
    assert_eq!(plan.outcome(), Outcome::Complete);

    let summary = PatchEngine::apply(&mut image, plan, ApplyMode::Commit).unwrap();
    assert_eq!(summary.total_patches(), 6);
    assert_eq!(
        &image[0xBDA4F0..0xBDA4F8],
        &[0x00, 0x14, 0x00, 0x00, 0x40, 0x0B, 0x00, 0x00]
    );
    assert_eq!(&image[0x054DF7..0x054DFB], &5120u32.to_le_bytes());
    assert_eq!(&image[0x4B430B..0x4B430F], &2880u32.to_le_bytes());
}
