//! Game settings update.
//!
//! The game stores its window size in a JSON document named
//! `userconfig.properties` next to the executable. After patching, the size
//! keys are rewritten so the game starts at the new resolution. The settings
//! file gets its own `.backup`, created once like the executable's.

use crate::backup::{atomic_write, backup_path, BackupError};
use crate::config::{Resolution, UserConfigSpec};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum UserConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{0} does not contain a JSON object")]
    NotAnObject(PathBuf),

    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Result of [`update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserConfigStatus {
    Updated {
        path: PathBuf,
        backup_created: bool,
    },
    /// The settings file does not exist yet (game never launched)
    Missing(PathBuf),
}

/// Result of [`restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserConfigRestore {
    Restored(PathBuf),
    NoBackup,
}

/// Set the window size keys in the settings file under `dir`.
pub fn update(
    dir: &Path,
    spec: &UserConfigSpec,
    resolution: Resolution,
) -> Result<UserConfigStatus, UserConfigError> {
    let path = dir.join(&spec.file);
    if !path.exists() {
        return Ok(UserConfigStatus::Missing(path));
    }

    let raw = fs::read(&path).map_err(|source| UserConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let document: Value =
        serde_json::from_slice(&raw).map_err(|source| UserConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    let Value::Object(mut settings) = document else {
        return Err(UserConfigError::NotAnObject(path));
    };

    let backup = backup_path(&path)?;
    let backup_created = if backup.exists() {
        false
    } else {
        atomic_write(&backup, &raw)?;
        info!("created settings backup: {}", backup.display());
        true
    };

    apply_settings(&mut settings, spec, resolution);
    atomic_write(&path, &encode(&settings)?)?;
    info!("updated {} to {resolution}", path.display());

    Ok(UserConfigStatus::Updated {
        path,
        backup_created,
    })
}

/// Put the settings backup back in place, if there is one.
pub fn restore(dir: &Path, spec: &UserConfigSpec) -> Result<UserConfigRestore, UserConfigError> {
    let path = dir.join(&spec.file);
    let backup = backup_path(&path)?;
    if !backup.exists() {
        return Ok(UserConfigRestore::NoBackup);
    }

    crate::backup::restore(&path, false)?;
    Ok(UserConfigRestore::Restored(path))
}

fn apply_settings(
    settings: &mut Map<String, Value>,
    spec: &UserConfigSpec,
    resolution: Resolution,
) {
    settings.insert(spec.width_key.clone(), Value::from(resolution.width));
    settings.insert(spec.height_key.clone(), Value::from(resolution.height));
    for (key, value) in &spec.set {
        settings.insert(key.clone(), Value::from(value.as_str()));
    }
}

/// Pretty JSON with tab indentation, matching the game's own output.
fn encode(settings: &Map<String, Value>) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    settings.serialize(&mut serializer)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> UserConfigSpec {
        let mut set = BTreeMap::new();
        set.insert("App.Window.Mode".to_string(), "BorderlessWindowed".to_string());
        UserConfigSpec {
            file: "userconfig.properties".to_string(),
            width_key: "App.Window.W".to_string(),
            height_key: "App.Window.H".to_string(),
            set,
        }
    }

    #[test]
    fn test_update_sets_keys_and_backs_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original = r#"{"App.Window.W": 1920, "App.Window.H": 1080, "App.Window.X": 10}"#;
        fs::write(temp_dir.path().join("userconfig.properties"), original).unwrap();

        let status = update(temp_dir.path(), &spec(), Resolution::new(5120, 2880)).unwrap();
        assert!(matches!(
            status,
            UserConfigStatus::Updated {
                backup_created: true,
                ..
            }
        ));

        let written = fs::read_to_string(temp_dir.path().join("userconfig.properties")).unwrap();
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["App.Window.W"], 5120);
        assert_eq!(value["App.Window.H"], 2880);
        assert_eq!(value["App.Window.X"], 10);
        assert_eq!(value["App.Window.Mode"], "BorderlessWindowed");
        assert!(written.contains("\n\t\""));

        let backup =
            fs::read_to_string(temp_dir.path().join("userconfig.properties.backup")).unwrap();
        assert_eq!(backup, original);
    }

    #[test]
    fn test_update_keeps_existing_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("userconfig.properties"), "{}").unwrap();
        fs::write(
            temp_dir.path().join("userconfig.properties.backup"),
            r#"{"first": true}"#,
        )
        .unwrap();

        let status = update(temp_dir.path(), &spec(), Resolution::new(5120, 2880)).unwrap();
        assert!(matches!(
            status,
            UserConfigStatus::Updated {
                backup_created: false,
                ..
            }
        ));
        let backup =
            fs::read_to_string(temp_dir.path().join("userconfig.properties.backup")).unwrap();
        assert_eq!(backup, r#"{"first": true}"#);
    }

    #[test]
    fn test_update_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let status = update(temp_dir.path(), &spec(), Resolution::new(5120, 2880)).unwrap();
        assert!(matches!(status, UserConfigStatus::Missing(_)));
    }

    #[test]
    fn test_update_rejects_non_object() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("userconfig.properties"), "[1, 2]").unwrap();
        let result = update(temp_dir.path(), &spec(), Resolution::new(5120, 2880));
        assert!(matches!(result, Err(UserConfigError::NotAnObject(_))));
    }

    #[test]
    fn test_restore_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original = r#"{"App.Window.W": 1920}"#;
        fs::write(temp_dir.path().join("userconfig.properties"), original).unwrap();

        update(temp_dir.path(), &spec(), Resolution::new(5120, 2880)).unwrap();
        let restored = restore(temp_dir.path(), &spec()).unwrap();

        assert!(matches!(restored, UserConfigRestore::Restored(_)));
        let content = fs::read_to_string(temp_dir.path().join("userconfig.properties")).unwrap();
        assert_eq!(content, original);
        assert!(!temp_dir.path().join("userconfig.properties.backup").exists());
    }

    #[test]
    fn test_restore_without_backup_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            restore(temp_dir.path(), &spec()).unwrap(),
            UserConfigRestore::NoBackup
        );
    }
}
