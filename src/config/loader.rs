use crate::config::schema::{PatchProfile, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Profile for the known Steam build, shipped inside the binary.
pub const BUILTIN_PROFILE: &str = include_str!("../../profiles/hundred-line.toml");

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    /// The profile parsed but describes patches that cannot be applied
    Validation {
        path: Option<PathBuf>,
        profile: String,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation {
                path: None,
                profile,
                source,
            } => ConfigError::Validation {
                path: Some(path),
                profile,
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot open patch profile {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "malformed patch profile")?;
                if let Some(path) = path {
                    write!(f, " {}", path.display())?;
                }
                write!(f, ": {source}")
            }
            ConfigError::Validation {
                path,
                profile,
                source,
            } => {
                write!(f, "patch profile '{profile}'")?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                let count = source.issues.len();
                let noun = if count == 1 { "problem" } else { "problems" };
                write!(f, " has {count} {noun} and cannot be used to patch:\n{source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchProfile, ConfigError> {
    let profile: PatchProfile = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    profile
        .validate()
        .map_err(|source| ConfigError::Validation {
            path: None,
            profile: profile.name().to_string(),
            source,
        })?;
    Ok(profile)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchProfile, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load the built-in profile.
pub fn builtin() -> Result<PatchProfile, ConfigError> {
    load_from_str(BUILTIN_PROFILE)
}
