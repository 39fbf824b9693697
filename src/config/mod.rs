pub mod discovery;
pub mod loader;
pub mod schema;

pub use discovery::discover_profiles;
pub use loader::{builtin, load_from_path, load_from_str, ConfigError, BUILTIN_PROFILE};
pub use schema::{
    Field, Metadata, PatchProfile, RawPatch, Resolution, ResolutionTable, SiteDefinition,
    UserConfigSpec, ValidationError, ValidationIssue,
};
