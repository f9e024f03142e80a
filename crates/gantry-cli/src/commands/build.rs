use gantry_cloud::DockerClient;
use gantry_core::ImageTags;
use std::path::PathBuf;

use super::deploy_pipeline::{self, PipelineInput, RunContext};
use super::{BuildOverrides, LOCAL_REGISTRY};

/// Build the image locally without publishing it.
pub async fn build(overrides: &BuildOverrides, allow_dirty: bool) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    deploy_pipeline::ensure_clean(&project_dir, allow_dirty)?;

    let config = super::load_config(&project_dir, overrides)?;
    let context = RunContext::resolve(&project_dir, None)?;
    let registry = config.registry.url.as_deref().unwrap_or(LOCAL_REGISTRY);
    let tags = ImageTags::new(registry, config.repository(), &context.commit_sha);

    let input = PipelineInput {
        project_dir: &project_dir,
        config: &config,
        context: &context,
    };
    let outcome = deploy_pipeline::build(&input, &tags, &DockerClient::new()).await?;

    for step in &outcome.steps {
        println!("  {step}");
    }
    println!();
    println!("Built: {}", tags.commit);
    if outcome.cache_degraded {
        println!("Warning: the layer cache was not updated; the next build starts cold");
    }
    Ok(())
}
