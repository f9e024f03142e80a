use gantry_build::template::{DEFAULT_TEMPLATE, TemplateValues, render_descriptor as render};
use gantry_build::{DockerfileGenerator, eject as eject_mod};
use gantry_core::{DependencyManifest, DeploySecrets, GantryConfig, ImageTags};
use std::path::{Path, PathBuf};

use super::BuildOverrides;
use super::deploy_pipeline::RunContext;

/// Print the Dockerfile `gantry build` would use.
pub fn render_dockerfile(overrides: &BuildOverrides) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = super::load_config(&project_dir, overrides)?;
    print!("{}", dockerfile_for(&project_dir, &config)?);
    Ok(())
}

/// Print the deployment descriptor `gantry deploy` would submit, with every
/// environment value masked. No secrets are read.
pub fn render_descriptor(commit: Option<String>) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = GantryConfig::load(&project_dir)?;
    let context = RunContext::resolve(&project_dir, commit)?;

    let registry = config.registry.url.clone().unwrap_or_else(|| {
        format!("<account>.dkr.ecr.{}.amazonaws.com", config.project.region)
    });
    let tags = ImageTags::new(&registry, config.repository(), &context.commit_sha);
    let placeholders =
        DeploySecrets::from_lookup(&config.deploy.bucket_name_env, |name| Some(format!("<{name}>")))?;

    let template = eject_mod::load_ejected_template(&project_dir)?
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_owned());
    let values = TemplateValues::new(&config, &tags, &placeholders);
    let descriptor = render(&template, &values, &config.deploy.env)?;

    println!("{}", descriptor.to_redacted_json()?);
    Ok(())
}

fn dockerfile_for(project_dir: &Path, config: &GantryConfig) -> anyhow::Result<String> {
    if eject_mod::is_ejected(project_dir) {
        return Ok(eject_mod::load_ejected_dockerfile(project_dir)?);
    }
    let manifest = DependencyManifest::load(project_dir, &config.build.manifest)?;
    Ok(DockerfileGenerator::new(config, &manifest).render()?)
}
