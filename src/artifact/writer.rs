use super::clock::{Clock, LocalClock};
use crate::models::Segment;
use crate::{Error, Result};
use base64::Engine as _;
use chrono::NaiveDateTime;
use image::ImageFormat;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const NO_ORIGIN_DIR: &str = "new_generation";
const NO_ORIGIN_PREFIX: &str = "generate";

/// What happens when two images map to the same path within one second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// The later write replaces the earlier file.
    #[default]
    Overwrite,
    /// Append `_1`, `_2`, ... until the name is free.
    Sequence,
}

/// Directory and filename prefix derived from the origin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub dir: String,
    pub prefix: String,
}

impl ArtifactName {
    /// `inputs/sample1.png` maps to `sample1/sample1_*`; no origin maps to
    /// `new_generation/generate_*`.
    pub fn for_origin(origin: Option<&Path>) -> Self {
        match origin.and_then(stem_of) {
            Some(stem) => Self {
                dir: stem.clone(),
                prefix: stem,
            },
            None => Self {
                dir: NO_ORIGIN_DIR.to_string(),
                prefix: NO_ORIGIN_PREFIX.to_string(),
            },
        }
    }
}

/// Base name up to the first dot.
fn stem_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.split('.').next().unwrap_or_default();
    (!stem.is_empty()).then(|| stem.to_string())
}

/// `<root>/<dir>/<prefix>_<YYYY-MM-DD_HH-MM-SS>.png`
pub fn artifact_path(root: &Path, name: &ArtifactName, timestamp: NaiveDateTime) -> PathBuf {
    root.join(&name.dir).join(format!(
        "{}_{}.png",
        name.prefix,
        timestamp.format(TIMESTAMP_FORMAT)
    ))
}

fn next_free_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    (1u32..)
        .map(|n| path.with_file_name(format!("{}_{}.png", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}

fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::Decode(format!("Invalid base64 image payload: {}", e)))
}

/// Outcome of writing one segment list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub texts: usize,
    pub saved: Vec<PathBuf>,
    pub failures: Vec<String>,
}

pub struct ArtifactWriter {
    output_root: PathBuf,
    collision: CollisionPolicy,
    clock: Arc<dyn Clock>,
}

impl ArtifactWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            collision: CollisionPolicy::default(),
            clock: Arc::new(LocalClock),
        }
    }

    pub fn with_collision_policy(mut self, collision: CollisionPolicy) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Print text segments to `out` and save image segments in order.
    ///
    /// A failing image is recorded in the report and does not stop the
    /// remaining segments; files already written stay on disk.
    pub async fn write_segments<W: Write + Send>(
        &self,
        segments: &[Segment],
        origin: Option<&Path>,
        out: &mut W,
    ) -> Result<WriteReport> {
        let mut report = WriteReport::default();

        writeln!(out, "============ Generation result ============")?;

        if !segments.iter().any(Segment::is_image) {
            warn!("Model output contains no image");
        }

        for segment in segments {
            match segment {
                Segment::Text(text) => {
                    writeln!(out, "Output text: {}", text)?;
                    report.texts += 1;
                }
                Segment::Image(payload) => match self.save_image(payload, origin).await {
                    Ok(path) => report.saved.push(path),
                    Err(e) => {
                        error!("Failed to save image: {}", e);
                        report.failures.push(e.to_string());
                    }
                },
            }
        }

        writeln!(out, "===========================================")?;
        out.flush()?;

        Ok(report)
    }

    /// Decode one base64 payload and persist it as PNG.
    pub async fn save_image(&self, payload: &str, origin: Option<&Path>) -> Result<PathBuf> {
        let bytes = decode_payload(payload)?;
        let name = ArtifactName::for_origin(origin);
        let path = artifact_path(&self.output_root, &name, self.clock.now());
        let collision = self.collision;

        let saved = tokio::task::spawn_blocking(move || Self::save_png_sync(&bytes, path, collision))
            .await
            .map_err(|e| Error::Invariant(format!("Image save task join error: {}", e)))??;

        info!("Saved image: {}", saved.display());
        Ok(saved)
    }

    fn save_png_sync(bytes: &[u8], path: PathBuf, collision: CollisionPolicy) -> Result<PathBuf> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::Decode(format!("Payload is not a valid image: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path = match collision {
            CollisionPolicy::Overwrite => path,
            CollisionPolicy::Sequence => next_free_path(path),
        };

        image.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }
}
