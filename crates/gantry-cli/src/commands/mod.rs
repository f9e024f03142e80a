mod build;
mod cache;
mod ci;
mod deploy;
mod deploy_pipeline;
mod doctor;
mod eject;
mod init;
mod render;
mod status;

use std::path::Path;

use gantry_core::GantryConfig;

pub use build::build;
pub use cache::{cache_clear, cache_list};
pub use ci::ci_init;
pub use deploy::deploy;
pub use doctor::doctor;
pub use eject::eject;
pub use init::init_project;
pub use render::{render_descriptor, render_dockerfile};
pub use status::status;

/// Registry host used to tag images from `gantry build` when no registry is
/// configured. Such tags are never pushed.
pub(crate) const LOCAL_REGISTRY: &str = "gantry.local";

/// Command-line overrides of `[build]` settings.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct BuildOverrides {
    /// uWSGI version to pin (overrides build.server_version)
    #[arg(long)]
    pub server_version: Option<String>,
    /// User the server runs as (overrides build.execution_user_name)
    #[arg(long)]
    pub user: Option<String>,
}

impl BuildOverrides {
    /// Apply to `config` and re-validate, so an override cannot smuggle in
    /// a privileged user.
    pub(crate) fn apply(&self, config: &mut GantryConfig) -> anyhow::Result<()> {
        if let Some(version) = &self.server_version {
            config.build.server_version = version.clone();
        }
        if let Some(user) = &self.user {
            config.build.execution_user_name = user.clone();
        }
        config.validate()?;
        Ok(())
    }
}

/// Load gantry.toml from `project_dir` with command-line overrides applied.
pub(crate) fn load_config(
    project_dir: &Path,
    overrides: &BuildOverrides,
) -> anyhow::Result<GantryConfig> {
    let mut config = GantryConfig::load(project_dir)?;
    overrides.apply(&mut config)?;
    Ok(config)
}
