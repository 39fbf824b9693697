//! Patch engine - validates descriptors against an image and applies them
//!
//! Patching is split in two phases:
//! - `plan` compares every descriptor's expected bytes against the image and
//!   sorts it into accepted or skipped, without touching the image
//! - `apply` writes the accepted replacements (or only reports them in
//!   dry-run mode)
//!
//! A descriptor whose precondition fails is skipped on its own; the rest of
//! the set still applies.

use crate::patch::{Hex, PatchDescriptor, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Whether `apply` writes to the image or only reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Analysis only, the image is left untouched
    DryRun,
    /// Accepted patches are written into the image
    Commit,
}

impl ApplyMode {
    pub fn from_commit(commit: bool) -> Self {
        if commit {
            ApplyMode::Commit
        } else {
            ApplyMode::DryRun
        }
    }

    pub fn is_commit(self) -> bool {
        self == ApplyMode::Commit
    }
}

/// A descriptor whose expected bytes were found in the image at plan time.
///
/// Only [`PatchEngine::plan`] creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPatch {
    descriptor: PatchDescriptor,
}

impl ValidatedPatch {
    pub fn descriptor(&self) -> &PatchDescriptor {
        &self.descriptor
    }
}

/// Why a descriptor was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Bytes at the offset differ from the expected original
    Mismatch { expected: Vec<u8>, found: Vec<u8> },
    /// Bytes at the offset already equal the replacement
    AlreadyApplied { expected: Vec<u8>, found: Vec<u8> },
    /// Range intersects a descriptor accepted earlier in the same plan
    Overlaps { other_offset: usize },
    /// The descriptor's range does not fit inside the image
    OutOfBounds {
        offset: usize,
        len: usize,
        image_len: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Mismatch { expected, found } => write!(
                f,
                "expected {} ({}), found {} ({})",
                Hex(expected),
                Value(expected),
                Hex(found),
                Value(found)
            ),
            SkipReason::AlreadyApplied { expected, found } => write!(
                f,
                "expected {} ({}), found {} ({}), already patched",
                Hex(expected),
                Value(expected),
                Hex(found),
                Value(found)
            ),
            SkipReason::Overlaps { other_offset } => write!(
                f,
                "range overlaps patch accepted at 0x{other_offset:08X}"
            ),
            SkipReason::OutOfBounds {
                offset,
                len,
                image_len,
            } => write!(
                f,
                "range 0x{offset:08X}+{len} exceeds image of {image_len} bytes"
            ),
        }
    }
}

/// A descriptor that failed validation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPatch {
    pub descriptor: PatchDescriptor,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "0x{:08X}: skipped: {}", self.descriptor.offset(), self.reason)?;
        write!(f, "              {}", self.descriptor.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEntry {
    Accepted(ValidatedPatch),
    Skipped(SkippedPatch),
}

/// How much of a descriptor set was usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every descriptor was accepted
    Complete,
    /// Some descriptors were accepted, some skipped
    Partial,
    /// Nothing was accepted; likely the wrong build or an already patched file
    Empty,
}

impl Outcome {
    fn from_counts(accepted: usize, skipped: usize) -> Self {
        match (accepted, skipped) {
            (0, _) => Outcome::Empty,
            (_, 0) => Outcome::Complete,
            _ => Outcome::Partial,
        }
    }
}

/// Validated outcome of checking descriptors against one image.
///
/// Entries keep the caller's descriptor order. The plan remembers the length
/// and xxh3 fingerprint of the image it was built from, so it cannot be
/// applied to a different buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchPlan does nothing until passed to PatchEngine::apply"]
pub struct PatchPlan {
    entries: Vec<PlanEntry>,
    image_len: usize,
    fingerprint: u64,
}

impl PatchPlan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn accepted(&self) -> impl Iterator<Item = &ValidatedPatch> {
        self.entries.iter().filter_map(|entry| match entry {
            PlanEntry::Accepted(patch) => Some(patch),
            PlanEntry::Skipped(_) => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedPatch> {
        self.entries.iter().filter_map(|entry| match entry {
            PlanEntry::Skipped(skip) => Some(skip),
            PlanEntry::Accepted(_) => None,
        })
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// Skips whose bytes already hold the replacement value.
    pub fn already_applied_count(&self) -> usize {
        self.skipped()
            .filter(|skip| matches!(skip.reason, SkipReason::AlreadyApplied { .. }))
            .count()
    }

    /// True when no descriptor was accepted.
    pub fn is_empty(&self) -> bool {
        self.accepted_count() == 0
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.accepted_count(), self.skipped_count())
    }

    /// xxh3 of the image this plan was validated against.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// One accepted patch as reported by `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatch {
    pub offset: usize,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub description: String,
}

impl fmt::Display for AppliedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "0x{:08X}: {} -> {}",
            self.offset,
            Value(&self.before),
            Value(&self.after)
        )?;
        write!(f, "              {}", self.description)
    }
}

impl From<ValidatedPatch> for AppliedPatch {
    fn from(patch: ValidatedPatch) -> Self {
        let descriptor = patch.descriptor;
        Self {
            offset: descriptor.offset(),
            before: descriptor.expected().to_vec(),
            after: descriptor.replacement().to_vec(),
            description: descriptor.description().to_string(),
        }
    }
}

/// Structured report of an `apply` call.
///
/// The listing is identical for dry-run and commit; only `mode` differs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "AppliedSummary should be checked for an empty outcome"]
pub struct AppliedSummary {
    pub mode: ApplyMode,
    pub applied: Vec<AppliedPatch>,
    pub skipped: Vec<SkippedPatch>,
}

impl AppliedSummary {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.applied.len(), self.skipped.len())
    }

    pub fn total_patches(&self) -> usize {
        self.applied.len()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.len()
    }
}

impl fmt::Display for AppliedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for patch in &self.applied {
            writeln!(f, "{patch}")?;
        }
        for skip in &self.skipped {
            writeln!(f, "{skip}")?;
        }
        writeln!(f, "Total patches: {}", self.total_patches())?;
        write!(f, "Skipped: {}", self.total_skipped())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(
        "plan was built for a different image ({plan_len} bytes, xxh3 {plan_fingerprint:016x}), \
         got {image_len} bytes, xxh3 {image_fingerprint:016x}"
    )]
    StalePlan {
        plan_len: usize,
        plan_fingerprint: u64,
        image_len: usize,
        image_fingerprint: u64,
    },
}

/// Validates and applies a fixed list of patch descriptors.
///
/// The engine owns only the descriptor list. Images are borrowed per call,
/// so separate images can be patched concurrently with separate borrows.
#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    descriptors: Vec<PatchDescriptor>,
}

impl PatchEngine {
    pub fn new(descriptors: Vec<PatchDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[PatchDescriptor] {
        &self.descriptors
    }

    /// Check every descriptor against the image. Never mutates the image.
    ///
    /// Accepted entries always cover disjoint ranges: a matching descriptor
    /// that overlaps one accepted before it is skipped instead.
    pub fn plan(&self, image: &[u8]) -> PatchPlan {
        let mut entries = Vec::with_capacity(self.descriptors.len());
        let mut accepted: Vec<&PatchDescriptor> = Vec::new();

        for descriptor in &self.descriptors {
            let entry = match check_descriptor(descriptor, image) {
                PlanEntry::Accepted(patch) => {
                    let clash = accepted
                        .iter()
                        .find(|other| other.overlaps(descriptor))
                        .map(|other| other.offset());
                    match clash {
                        Some(other_offset) => {
                            info!(
                                offset = descriptor.offset(),
                                other_offset,
                                "overlapping range, skipping: {}",
                                descriptor.description()
                            );
                            PlanEntry::Skipped(SkippedPatch {
                                descriptor: patch.descriptor,
                                reason: SkipReason::Overlaps { other_offset },
                            })
                        }
                        None => {
                            accepted.push(descriptor);
                            PlanEntry::Accepted(patch)
                        }
                    }
                }
                skipped => skipped,
            };
            entries.push(entry);
        }

        PatchPlan {
            entries,
            image_len: image.len(),
            fingerprint: xxh3_64(image),
        }
    }

    /// Apply a plan produced by [`PatchEngine::plan`] for this same image.
    ///
    /// In [`ApplyMode::DryRun`] no byte is written. In [`ApplyMode::Commit`]
    /// each accepted range is overwritten in plan order. Fails only when the
    /// image is not the one the plan was built from.
    pub fn apply(
        image: &mut [u8],
        plan: PatchPlan,
        mode: ApplyMode,
    ) -> Result<AppliedSummary, EngineError> {
        let image_fingerprint = xxh3_64(image);
        if image.len() != plan.image_len || image_fingerprint != plan.fingerprint {
            return Err(EngineError::StalePlan {
                plan_len: plan.image_len,
                plan_fingerprint: plan.fingerprint,
                image_len: image.len(),
                image_fingerprint,
            });
        }

        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for entry in plan.entries {
            match entry {
                PlanEntry::Accepted(patch) => {
                    if mode.is_commit() {
                        let descriptor = patch.descriptor();
                        let start = descriptor.offset();
                        // In bounds: checked by plan against this exact image.
                        image[start..start + descriptor.len()]
                            .copy_from_slice(descriptor.replacement());
                        debug!(offset = start, "wrote {}", descriptor.description());
                    }
                    applied.push(AppliedPatch::from(patch));
                }
                PlanEntry::Skipped(skip) => skipped.push(skip),
            }
        }

        Ok(AppliedSummary {
            mode,
            applied,
            skipped,
        })
    }
}

fn check_descriptor(descriptor: &PatchDescriptor, image: &[u8]) -> PlanEntry {
    let offset = descriptor.offset();

    let current = match descriptor.end() {
        Some(end) if end <= image.len() => &image[offset..end],
        _ => {
            info!(
                offset,
                len = descriptor.len(),
                image_len = image.len(),
                "out of bounds, skipping: {}",
                descriptor.description()
            );
            return PlanEntry::Skipped(SkippedPatch {
                descriptor: descriptor.clone(),
                reason: SkipReason::OutOfBounds {
                    offset,
                    len: descriptor.len(),
                    image_len: image.len(),
                },
            });
        }
    };

    if current == descriptor.expected() {
        debug!(offset, "accepted: {}", descriptor.description());
        return PlanEntry::Accepted(ValidatedPatch {
            descriptor: descriptor.clone(),
        });
    }

    let expected = descriptor.expected().to_vec();
    let found = current.to_vec();
    let reason = if current == descriptor.replacement() {
        SkipReason::AlreadyApplied { expected, found }
    } else {
        SkipReason::Mismatch { expected, found }
    };
    info!(
        offset,
        "mismatch at 0x{offset:X}, skipping: {}: {reason}",
        descriptor.description()
    );

    PlanEntry::Skipped(SkippedPatch {
        descriptor: descriptor.clone(),
        reason,
    })
}
