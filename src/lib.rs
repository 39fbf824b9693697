//! Res Patcher: verified binary patching of hardcoded resolution limits
//!
//! Game executables often cap the selectable resolution with a few
//! little-endian integers baked into a resolution table and into instruction
//! immediates. This crate rewrites those integers in place, touching only
//! bytes that still hold their known original value.
//!
//! # Architecture
//!
//! Every patch is a [`PatchDescriptor`]: an absolute offset, the bytes
//! expected there, and same-length replacement bytes. [`PatchEngine::plan`]
//! checks descriptors against an image and splits them into accepted and
//! skipped; [`PatchEngine::apply`] writes the accepted ones, or only reports
//! them in dry-run mode.
//!
//! Offsets are data, not code: a [`PatchProfile`] (TOML) lists the sites for
//! one executable build.
//!
//! # Safety
//!
//! - A descriptor is applied only if its expected bytes are present
//! - Image length never changes
//! - Mismatched or out-of-range descriptors are skipped and reported
//! - Backups are created once and never overwritten
//! - Atomic file writes (tempfile + fsync + rename)
//!
//! # Example
//!
//! ```
//! use res_patcher::{ApplyMode, Outcome, PatchDescriptor, PatchEngine};
//!
//! let mut image = vec![0u8; 200];
//! image[100..104].copy_from_slice(&3840u32.to_le_bytes());
//!
//! let engine = PatchEngine::new(vec![PatchDescriptor::u32_le(100, 3840, 5120, "width")]);
//! let plan = engine.plan(&image);
//! let summary = PatchEngine::apply(&mut image, plan, ApplyMode::Commit).unwrap();
//!
//! assert_eq!(summary.outcome(), Outcome::Complete);
//! assert_eq!(&image[100..104], &5120u32.to_le_bytes());
//! ```

pub mod backup;
pub mod config;
pub mod engine;
pub mod patch;
pub mod userconfig;

// Re-exports
pub use backup::{atomic_write, ensure_backup, BackupError, BackupStatus, RestoreStatus};
pub use config::{
    builtin, discover_profiles, load_from_path, load_from_str, ConfigError, PatchProfile,
    Resolution, UserConfigSpec,
};
pub use engine::{
    AppliedPatch, AppliedSummary, ApplyMode, EngineError, Outcome, PatchEngine, PatchPlan,
    PlanEntry, SkipReason, SkippedPatch, ValidatedPatch,
};
pub use patch::{DescriptorError, PatchDescriptor};
pub use userconfig::{UserConfigError, UserConfigRestore, UserConfigStatus};
