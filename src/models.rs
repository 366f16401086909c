//! Data models and structures
//!
//! Defines the normalized segment model, provider selection, generation
//! requests and environment configuration.

use crate::ai::mime::detect_image_mime;
use crate::artifact::WriteReport;
use crate::{Error, Result};
use base64::Engine as _;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One provider-agnostic unit of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Base64 text with any data-URI prefix already stripped.
    Image(String),
}

impl Segment {
    pub fn is_image(&self) -> bool {
        matches!(self, Segment::Image(_))
    }
}

/// Response layouts produced by the supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseShape {
    /// `choices[].message.{content,images}`
    ChatCompletion,
    /// `candidates[0].content.parts[]`
    GenerateContent,
    /// Flat list of strings and `{image_url: {url}}` mappings.
    MessageContent,
}

/// Raw provider response, tagged with the layout it is expected to follow.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub shape: ResponseShape,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn new(shape: ResponseShape, body: serde_json::Value) -> Self {
        Self { shape, body }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AiProvider {
    /// OpenRouter chat completions.
    #[value(name = "openrouter")]
    OpenRouter,
    /// Gemini API `generateContent`.
    Gemini,
    /// Vertex AI `generateContent`.
    Vertex,
    /// Gemini output re-expressed as a chat message content list.
    Message,
}

impl AiProvider {
    pub fn default_model(self) -> &'static str {
        match self {
            AiProvider::OpenRouter => "google/gemini-2.5-flash-image-preview",
            AiProvider::Gemini | AiProvider::Vertex | AiProvider::Message => {
                "gemini-2.5-flash-image-preview"
            }
        }
    }
}

/// An input image loaded once per run and reused by every iteration.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub base64: String,
}

impl InputImage {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(path, &bytes))
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        Self {
            path: path.to_path_buf(),
            mime_type: detect_image_mime(bytes),
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Everything a provider client needs to issue one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub query: String,
    pub input_image: Option<InputImage>,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(system_instruction: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            query: query.into(),
            input_image: None,
            temperature: 0.7,
        }
    }

    pub fn with_input_image(mut self, image: InputImage) -> Self {
        self.input_image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Result of one generate, normalize and write pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed { index: u32, report: WriteReport },
    Failed { index: u32, error: String },
}

impl IterationOutcome {
    pub fn index(&self) -> u32 {
        match self {
            IterationOutcome::Completed { index, .. } | IterationOutcome::Failed { index, .. } => {
                *index
            }
        }
    }
}

/// Per-iteration results of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcomes: Vec<IterationOutcome>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IterationOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn images_saved(&self) -> usize {
        self.reports().map(|r| r.saved.len()).sum()
    }

    pub fn image_failures(&self) -> usize {
        self.reports().map(|r| r.failures.len()).sum()
    }

    fn reports(&self) -> impl Iterator<Item = &WriteReport> {
        self.outcomes.iter().filter_map(|o| match o {
            IterationOutcome::Completed { report, .. } => Some(report),
            IterationOutcome::Failed { .. } => None,
        })
    }
}

// Configuration
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub gemini_api_key: Option<String>,
    pub vertex_project: Option<String>,
    pub vertex_location: String,
    pub vertex_access_token: Option<String>,
}

impl Config {
    /// Read configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
        }
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            vertex_project: get("VERTEX_PROJECT"),
            vertex_location: get("VERTEX_LOCATION").unwrap_or_else(|| "global".to_string()),
            vertex_access_token: get("VERTEX_ACCESS_TOKEN"),
        }
    }

    /// Check that the credentials needed by `provider` are present.
    pub fn validate_for(&self, provider: AiProvider) -> Result<()> {
        let missing = match provider {
            AiProvider::OpenRouter => self
                .openrouter_api_key
                .is_none()
                .then_some("OPENROUTER_API_KEY"),
            AiProvider::Gemini | AiProvider::Message => self
                .gemini_api_key
                .is_none()
                .then_some("GEMINI_API_KEY (or GOOGLE_API_KEY)"),
            AiProvider::Vertex => {
                if self.vertex_project.is_none() {
                    Some("VERTEX_PROJECT")
                } else if self.vertex_access_token.is_none() {
                    Some("VERTEX_ACCESS_TOKEN")
                } else {
                    None
                }
            }
        };

        match missing {
            Some(key) => Err(Error::Config(format!("{} not set", key))),
            None => Ok(()),
        }
    }
}
