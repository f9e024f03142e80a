use gantry_cloud::{AwsClient, DockerClient};
use gantry_core::DeploySecrets;
use std::path::PathBuf;

use super::BuildOverrides;
use super::deploy_pipeline::{self, PipelineInput, RunContext};

/// Execute the full deploy pipeline.
pub async fn deploy(
    commit: Option<String>,
    allow_dirty: bool,
    overrides: &BuildOverrides,
) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    deploy_pipeline::ensure_clean(&project_dir, allow_dirty)?;

    let config = super::load_config(&project_dir, overrides)?;
    // Missing secrets fail the run before anything is built.
    let secrets = DeploySecrets::from_env(&config.deploy.bucket_name_env)?;
    let context = RunContext::resolve(&project_dir, commit)?;

    println!(
        "Deploying {} at {} to Lightsail ({})...",
        config.project.name, context.commit_sha, config.project.region
    );

    let input = PipelineInput {
        project_dir: &project_dir,
        config: &config,
        context: &context,
    };
    let outcome = deploy_pipeline::deploy(
        &input,
        &secrets,
        &DockerClient::new(),
        &AwsClient::new(),
    )
    .await?;

    for step in &outcome.steps {
        println!("  {step}");
    }
    if outcome.cache_degraded {
        println!("  Warning: the layer cache was not updated; the next build starts cold");
    }

    println!();
    println!("Image:  {}", outcome.published.tags.commit);
    println!("Digest: {}", outcome.published.digest);
    println!(
        "Deployment submitted ({}). Lightsail rolls back on its own if health checks fail.",
        outcome.receipt.state
    );
    println!("Follow it with: gantry status");
    Ok(())
}
