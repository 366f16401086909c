//! Artifact persistence
//!
//! Prints text segments for the operator and realizes image segments as
//! timestamped PNG files under `<output_root>/<stem>/`.

pub mod clock;
pub mod writer;

pub use clock::{Clock, FixedClock, LocalClock};
pub use writer::{artifact_path, ArtifactName, ArtifactWriter, CollisionPolicy, WriteReport};
