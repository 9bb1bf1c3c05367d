//! Evidence source adapters.

pub mod file;

pub use file::{FileEvidenceSource, ManifestJob, RunManifest};
