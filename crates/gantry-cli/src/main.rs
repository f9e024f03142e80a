mod commands;

use clap::{Parser, Subcommand};
use commands::BuildOverrides;

#[derive(Parser)]
#[command(
    name = "gantry",
    about = "Build and deploy a giftless Git LFS server to AWS Lightsail"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add gantry.toml and .env.example to an existing giftless project
    Init,
    /// Build the server image locally, using the layer cache
    Build {
        #[command(flatten)]
        overrides: BuildOverrides,
        /// Allow building with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
    },
    /// Build, publish to ECR and submit a Lightsail deployment
    Deploy {
        /// Commit sha to tag the image with (defaults to $GITHUB_SHA, then HEAD)
        #[arg(long)]
        commit: Option<String>,
        /// Allow deploying with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
        #[command(flatten)]
        overrides: BuildOverrides,
    },
    /// Print a generated artifact without building anything
    Render {
        #[command(subcommand)]
        target: RenderTarget,
    },
    /// Eject the Dockerfile and deployment template for manual customization
    Eject,
    /// Show the Lightsail container service and its deployments
    Status,
    /// Check local tools, credentials and configuration
    Doctor,
    /// Inspect or clear the build layer cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage the CI/CD pipeline
    Ci {
        #[command(subcommand)]
        action: CiAction,
    },
}

#[derive(Subcommand)]
enum RenderTarget {
    /// The two-stage Dockerfile
    Dockerfile {
        #[command(flatten)]
        overrides: BuildOverrides,
    },
    /// The Lightsail deployment descriptor, with environment values masked
    Descriptor {
        /// Commit sha the image reference points at (defaults to HEAD)
        #[arg(long)]
        commit: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cache entries
    List,
    /// Delete every cache entry
    Clear,
}

#[derive(Subcommand)]
enum CiAction {
    /// Write a GitHub Actions workflow that deploys on push to main
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("no .env file"),
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Build {
            overrides,
            allow_dirty,
        } => commands::build(&overrides, allow_dirty).await?,
        Commands::Deploy {
            commit,
            allow_dirty,
            overrides,
        } => commands::deploy(commit, allow_dirty, &overrides).await?,
        Commands::Render { target } => match target {
            RenderTarget::Dockerfile { overrides } => commands::render_dockerfile(&overrides)?,
            RenderTarget::Descriptor { commit } => commands::render_descriptor(commit)?,
        },
        Commands::Eject => commands::eject().await?,
        Commands::Status => commands::status().await?,
        Commands::Doctor => commands::doctor().await?,
        Commands::Cache { action } => match action {
            CacheAction::List => commands::cache_list()?,
            CacheAction::Clear => commands::cache_clear()?,
        },
        Commands::Ci { action } => match action {
            CiAction::Init => commands::ci_init().await?,
        },
    }

    Ok(())
}
