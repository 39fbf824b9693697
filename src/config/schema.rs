use crate::patch::{parse_hex_bytes, PatchDescriptor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Declarative description of one executable build's patch sites.
#[derive(Debug, Deserialize, Clone)]
pub struct PatchProfile {
    #[serde(default)]
    pub meta: Metadata,
    pub resolution: ResolutionTable,
    #[serde(default)]
    pub sites: Vec<SiteDefinition>,
    #[serde(default)]
    pub raw: Vec<RawPatch>,
    #[serde(default)]
    pub userconfig: Option<UserConfigSpec>,
}

impl PatchProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.sites.is_empty() && self.raw.is_empty() {
            issues.push(ValidationIssue::EmptySiteList);
        }

        for (label, resolution) in [
            ("resolution.original", self.resolution.original),
            ("resolution.target", self.resolution.target),
        ] {
            if let Err(issue) = resolution.check(label) {
                issues.push(issue);
            }
        }

        let mut seen = HashSet::new();
        let ids = self
            .sites
            .iter()
            .enumerate()
            .map(|(index, site)| ("sites", index, site.id.as_str()))
            .chain(
                self.raw
                    .iter()
                    .enumerate()
                    .map(|(index, raw)| ("raw", index, raw.id.as_str())),
            );
        for (section, index, id) in ids {
            if id.trim().is_empty() {
                issues.push(ValidationIssue::EmptyId { section, index });
            } else if !seen.insert(id) {
                issues.push(ValidationIssue::DuplicateId(id.to_string()));
            }
        }

        let mut ranges: Vec<(&str, PatchDescriptor)> = self
            .sites
            .iter()
            .map(|site| {
                let descriptor = site.descriptor(&self.resolution, self.resolution.target);
                (site.id.as_str(), descriptor)
            })
            .collect();

        for raw in &self.raw {
            match raw.descriptor() {
                Ok(descriptor) => ranges.push((raw.id.as_str(), descriptor)),
                Err(issue) => issues.push(issue),
            }
        }

        for (idx, (first_id, first)) in ranges.iter().enumerate() {
            for (second_id, second) in &ranges[idx + 1..] {
                if first.overlaps(second) {
                    issues.push(ValidationIssue::Overlap {
                        first: first_id.to_string(),
                        second: second_id.to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Build the descriptor list for patching the original resolution to `target`.
    ///
    /// Sites come first in profile order, followed by raw patches.
    pub fn descriptors(
        &self,
        target: Resolution,
    ) -> Result<Vec<PatchDescriptor>, ValidationError> {
        target
            .check("target")
            .map_err(|issue| ValidationError { issues: vec![issue] })?;

        let mut descriptors: Vec<PatchDescriptor> = self
            .sites
            .iter()
            .map(|site| site.descriptor(&self.resolution, target))
            .collect();

        let mut issues = Vec::new();
        for raw in &self.raw {
            match raw.descriptor() {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(issue) => issues.push(issue),
            }
        }

        if issues.is_empty() {
            Ok(descriptors)
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Display name, falling back to the executable name.
    pub fn name(&self) -> &str {
        if !self.meta.name.is_empty() {
            return &self.meta.name;
        }
        self.meta.executable.as_deref().unwrap_or("unnamed")
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File name of the executable this profile targets
    #[serde(default)]
    pub executable: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ResolutionTable {
    /// Resolution hardcoded in the unpatched executable
    pub original: Resolution,
    /// Default replacement, overridable from the command line
    pub target: Resolution,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn get(&self, field: Field) -> u32 {
        match field {
            Field::Width => self.width,
            Field::Height => self.height,
        }
    }

    fn check(&self, label: &str) -> Result<(), ValidationIssue> {
        if self.width == 0 || self.height == 0 {
            return Err(ValidationIssue::ZeroDimension {
                field: label.to_string(),
                resolution: *self,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which half of a resolution a site stores.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Width,
    Height,
}

/// A little-endian `u32` location holding the original width or height.
#[derive(Debug, Deserialize, Clone)]
pub struct SiteDefinition {
    pub id: String,
    pub offset: usize,
    pub field: Field,
    #[serde(default)]
    pub description: String,
}

impl SiteDefinition {
    pub fn descriptor(&self, table: &ResolutionTable, target: Resolution) -> PatchDescriptor {
        let description = if self.description.is_empty() {
            self.id.clone()
        } else {
            self.description.clone()
        };
        PatchDescriptor::u32_le(
            self.offset,
            table.original.get(self.field),
            target.get(self.field),
            description,
        )
    }
}

/// A literal byte patch, independent of the target resolution.
#[derive(Debug, Deserialize, Clone)]
pub struct RawPatch {
    pub id: String,
    pub offset: usize,
    /// Hex bytes, e.g. `"40 0F 00 00"`
    pub expected: String,
    pub replacement: String,
    #[serde(default)]
    pub description: String,
}

impl RawPatch {
    pub fn descriptor(&self) -> Result<PatchDescriptor, ValidationIssue> {
        let malformed = |message: String| ValidationIssue::MalformedRaw {
            site_id: self.id.clone(),
            message,
        };

        let expected = parse_hex_bytes(&self.expected)
            .map_err(|e| malformed(format!("expected: {e}")))?;
        let replacement = parse_hex_bytes(&self.replacement)
            .map_err(|e| malformed(format!("replacement: {e}")))?;
        let description = if self.description.is_empty() {
            self.id.clone()
        } else {
            self.description.clone()
        };

        PatchDescriptor::new(self.offset, expected, replacement, description)
            .map_err(|e| malformed(e.to_string()))
    }
}

/// Where the game keeps its window settings, and which keys to rewrite.
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfigSpec {
    pub file: String,
    pub width_key: String,
    pub height_key: String,
    /// Extra string values written alongside the size
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptySiteList,
    /// Entry `index` of `[[sites]]` or `[[raw]]` has a blank id
    EmptyId {
        section: &'static str,
        index: usize,
    },
    DuplicateId(String),
    ZeroDimension {
        field: String,
        resolution: Resolution,
    },
    MalformedRaw {
        site_id: String,
        message: String,
    },
    Overlap {
        first: String,
        second: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptySiteList => write!(f, "patch profile contains no sites"),
            ValidationIssue::EmptyId { section, index } => {
                write!(f, "{section}[{index}] has an empty id")
            }
            ValidationIssue::DuplicateId(id) => write!(f, "duplicate site id '{id}'"),
            ValidationIssue::ZeroDimension { field, resolution } => {
                write!(f, "{field} must be positive, got {resolution}")
            }
            ValidationIssue::MalformedRaw { site_id, message } => {
                write!(f, "raw patch '{site_id}' is malformed: {message}")
            }
            ValidationIssue::Overlap { first, second } => {
                write!(f, "sites '{first}' and '{second}' cover overlapping bytes")
            }
        }
    }
}
