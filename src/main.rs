use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use genai_image_runner::app::{replay_file, App, AppOptions};
use genai_image_runner::artifact::{ArtifactWriter, CollisionPolicy};
use genai_image_runner::models::{AiProvider, Config, ResponseShape};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "genai-image-runner")]
#[command(about = "Generate or edit images with generative AI models")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call a provider COUNT times and save every returned image.
    Generate(GenerateArgs),
    /// Normalize and save a response body captured earlier.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Root directory for saved images.
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Add a numeric suffix instead of overwriting images saved in the same second.
    #[arg(long)]
    dedupe: bool,
}

impl OutputArgs {
    fn collision(&self) -> CollisionPolicy {
        if self.dedupe {
            CollisionPolicy::Sequence
        } else {
            CollisionPolicy::Overwrite
        }
    }
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long, value_enum, default_value = "openrouter")]
    provider: AiProvider,

    /// What to generate, or how to edit the input image.
    #[arg(long)]
    query: String,

    /// Image to edit; omit for plain text-to-image generation.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Override the built-in system instruction.
    #[arg(long)]
    system: Option<String>,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct ReplayArgs {
    #[arg(long, value_enum)]
    shape: ResponseShape,

    /// JSON file holding the raw response body.
    file: PathBuf,

    /// Input file the response belongs to; controls output naming.
    #[arg(long)]
    origin: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let config = Config::from_env()?;
    let collision = args.output.collision();

    let app = App::new(
        &config,
        AppOptions {
            provider: args.provider,
            model: args.model,
            query: args.query,
            system_instruction: args.system,
            input: args.input,
            temperature: args.temperature,
            output_dir: args.output.output_dir,
            collision,
        },
    )?;

    let summary = app.run(args.count, &mut std::io::stdout()).await;
    for outcome in &summary.outcomes {
        info!("{:?}", outcome);
    }

    Ok(())
}

async fn replay(args: ReplayArgs) -> Result<()> {
    let writer =
        ArtifactWriter::new(args.output.output_dir.clone()).with_collision_policy(args.output.collision());

    let report = replay_file(
        &writer,
        args.shape,
        &args.file,
        args.origin.as_deref(),
        &mut std::io::stdout(),
    )
    .await?;
    info!(
        "Replay finished: {} text segment(s), {} image(s) saved, {} failed",
        report.texts,
        report.saved.len(),
        report.failures.len()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genai_image_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let result = match args.command {
        Command::Generate(args) => generate(args).await,
        Command::Replay(args) => replay(args).await,
    };

    if let Err(e) = result {
        error!("Failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
