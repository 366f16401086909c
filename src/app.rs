//! Run orchestration: generate, normalize and write, repeated N times.

use crate::ai::{
    GeminiAuth, GeminiImageClient, GenerationService, MessageContentClient, OpenRouterClient,
};
use crate::artifact::{ArtifactWriter, CollisionPolicy, WriteReport};
use crate::models::{
    AiProvider, Config, Envelope, GenerationRequest, InputImage, IterationOutcome, ResponseShape,
    RunSummary,
};
use crate::normalize::normalize;
use crate::{prompts, Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Repeats one generation request and persists every result.
pub struct App {
    service: Box<dyn GenerationService>,
    writer: ArtifactWriter,
    request: GenerationRequest,
    run_id: Uuid,
}

/// Settings for building an [`App`] from configuration.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub provider: AiProvider,
    pub model: Option<String>,
    pub query: String,
    pub system_instruction: Option<String>,
    pub input: Option<PathBuf>,
    pub temperature: f32,
    pub output_dir: PathBuf,
    pub collision: CollisionPolicy,
}

impl App {
    /// Build an app from concrete dependencies.
    ///
    /// This is primarily useful for tests that need to inject a mock client.
    pub fn with_services(
        service: Box<dyn GenerationService>,
        writer: ArtifactWriter,
        request: GenerationRequest,
    ) -> Self {
        Self {
            service,
            writer,
            request,
            run_id: Uuid::new_v4(),
        }
    }

    /// Construct an app from environment configuration and CLI options.
    pub fn new(config: &Config, options: AppOptions) -> Result<Self> {
        config.validate_for(options.provider)?;

        let input_image = options
            .input
            .as_deref()
            .map(InputImage::from_path)
            .transpose()?;
        if let Some(image) = &input_image {
            info!(
                "Loaded input image {} ({}, {} base64 chars)",
                image.path.display(),
                image.mime_type,
                image.base64.len()
            );
        }

        let system_instruction = options.system_instruction.unwrap_or_else(|| {
            prompts::default_system_instruction(input_image.is_some()).to_string()
        });
        let mut request = GenerationRequest::new(system_instruction, options.query)
            .with_temperature(options.temperature);
        if let Some(image) = input_image {
            request = request.with_input_image(image);
        }

        let model = options
            .model
            .unwrap_or_else(|| options.provider.default_model().to_string());
        let service = Self::build_service(config, options.provider, model)?;

        let writer =
            ArtifactWriter::new(options.output_dir).with_collision_policy(options.collision);

        Ok(Self::with_services(service, writer, request))
    }

    fn build_service(
        config: &Config,
        provider: AiProvider,
        model: String,
    ) -> Result<Box<dyn GenerationService>> {
        fn required(value: &Option<String>, key: &str) -> Result<String> {
            value
                .clone()
                .ok_or_else(|| Error::Invariant(format!("{} validated in Config", key)))
        }

        info!("Provider: {:?} (model: {})", provider, model);

        let http_client = reqwest::Client::new();
        let service: Box<dyn GenerationService> = match provider {
            AiProvider::OpenRouter => Box::new(
                OpenRouterClient::new_with_client(
                    required(&config.openrouter_api_key, "OPENROUTER_API_KEY")?,
                    model,
                    http_client,
                )
                .with_base_url(config.openrouter_base_url.clone()),
            ),
            AiProvider::Gemini => Box::new(GeminiImageClient::new_with_client(
                GeminiAuth::ApiKey(required(&config.gemini_api_key, "GEMINI_API_KEY")?),
                model,
                http_client,
            )),
            AiProvider::Message => Box::new(MessageContentClient::from_client(
                GeminiImageClient::new_with_client(
                    GeminiAuth::ApiKey(required(&config.gemini_api_key, "GEMINI_API_KEY")?),
                    model,
                    http_client,
                ),
            )),
            AiProvider::Vertex => Box::new(GeminiImageClient::new_with_client(
                GeminiAuth::Vertex {
                    project: required(&config.vertex_project, "VERTEX_PROJECT")?,
                    location: config.vertex_location.clone(),
                    access_token: required(&config.vertex_access_token, "VERTEX_ACCESS_TOKEN")?,
                },
                model,
                http_client,
            )),
        };

        Ok(service)
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn origin(&self) -> Option<&Path> {
        self.request
            .input_image
            .as_ref()
            .map(|image| image.path.as_path())
    }

    /// Run `count` iterations back to back. Failures are recorded and never
    /// stop the loop.
    pub async fn run<W: Write + Send>(&self, count: u32, out: &mut W) -> RunSummary {
        info!(
            "Run {} starting: {} generation(s), output root {}",
            self.run_id,
            count,
            self.writer.output_root().display()
        );

        let mut outcomes = Vec::with_capacity(count as usize);

        for index in 1..=count {
            info!("Starting generation {}/{}", index, count);

            let outcome = match self.run_iteration(out).await {
                Ok(report) => {
                    if report.saved.is_empty() {
                        warn!("Generation {} produced no saved image", index);
                    }
                    IterationOutcome::Completed { index, report }
                }
                Err(e) => {
                    error!("Generation {} failed: {}", index, e);
                    IterationOutcome::Failed {
                        index,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let summary = RunSummary {
            run_id: self.run_id,
            outcomes,
        };
        info!(
            "Run {} finished: {} completed, {} failed, {} image(s) saved",
            summary.run_id,
            summary.completed(),
            summary.failed(),
            summary.images_saved()
        );

        summary
    }

    async fn run_iteration<W: Write + Send>(&self, out: &mut W) -> Result<WriteReport> {
        let envelope = self.service.generate(&self.request).await?;
        process_envelope(&self.writer, &envelope, self.origin(), out).await
    }
}

/// Normalize one envelope and hand its segments to the writer.
pub async fn process_envelope<W: Write + Send>(
    writer: &ArtifactWriter,
    envelope: &Envelope,
    origin: Option<&Path>,
    out: &mut W,
) -> Result<WriteReport> {
    let segments = normalize(envelope)?;
    writer.write_segments(&segments, origin, out).await
}

/// Process a previously saved response body without calling any provider.
pub async fn replay_file<W: Write + Send>(
    writer: &ArtifactWriter,
    shape: ResponseShape,
    path: &Path,
    origin: Option<&Path>,
    out: &mut W,
) -> Result<WriteReport> {
    let body = std::fs::read_to_string(path)?;
    let envelope = Envelope::new(shape, serde_json::from_str(&body)?);
    info!("Replaying {} as {:?}", path.display(), shape);
    process_envelope(writer, &envelope, origin, out).await
}
