use std::path::Path;

use gantry_build::cache::{CacheKey, CacheRestore, CacheStore};
use gantry_build::dockerfile::{self, DockerfileGenerator};
use gantry_build::template::{DEFAULT_TEMPLATE, TemplateValues, render_descriptor};
use gantry_build::{bundle, eject as eject_mod};
use gantry_cloud::aws::ecr_registry;
use gantry_cloud::{
    AwsClient, BuildRequest, CommandExecutor, DeploymentReceipt, DockerClient, PublishedImage,
};
use gantry_core::{DependencyManifest, DeploySecrets, GantryConfig, ImageTags};

/// Where a pipeline run gets its identity from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunContext {
    /// Full commit sha; tags the image
    pub commit_sha: String,
    /// Distinct per run; names the cache entry
    pub run_id: String,
    /// Runner OS; scopes the cache entry
    pub os: String,
}

impl RunContext {
    /// Resolve from `--commit`, then the CI environment, then the repository.
    pub(crate) fn resolve(project_dir: &Path, commit: Option<String>) -> anyhow::Result<Self> {
        Self::from_lookup(project_dir, commit, |name| {
            std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
        })
    }

    fn from_lookup<F>(project_dir: &Path, commit: Option<String>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: &String| !v.trim().is_empty();

        let commit_sha = match commit.or_else(|| lookup("GITHUB_SHA")).filter(non_empty) {
            Some(sha) => sha.trim().to_owned(),
            None => bundle::head_commit(project_dir)?,
        };
        if !is_commit_sha(&commit_sha) {
            anyhow::bail!("'{commit_sha}' is not a commit sha (expected 7-40 hex characters)");
        }

        let run_id = lookup("GITHUB_RUN_ID")
            .filter(non_empty)
            .unwrap_or_else(|| commit_sha.clone());
        let os = lookup("RUNNER_OS")
            .filter(non_empty)
            .unwrap_or_else(|| std::env::consts::OS.to_owned());

        Ok(Self {
            commit_sha,
            run_id,
            os,
        })
    }
}

fn is_commit_sha(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Shared inputs of one pipeline run.
pub(crate) struct PipelineInput<'a> {
    pub project_dir: &'a Path,
    pub config: &'a GantryConfig,
    pub context: &'a RunContext,
}

/// Result of a local build.
pub(crate) struct BuildOutcome {
    pub steps: Vec<String>,
    /// The build succeeded but the cache could not be restored or rotated
    pub cache_degraded: bool,
}

/// Result of a successful deploy pipeline run.
pub(crate) struct DeployOutcome {
    pub steps: Vec<String>,
    pub published: PublishedImage,
    pub receipt: DeploymentReceipt,
    pub cache_degraded: bool,
}

/// Refuse to run on uncommitted changes unless `allow_dirty`.
pub(crate) fn ensure_clean(project_dir: &Path, allow_dirty: bool) -> anyhow::Result<()> {
    if !allow_dirty && bundle::is_dirty(project_dir)? {
        anyhow::bail!(
            "uncommitted changes detected.\n\
             Commit your changes, or pass --allow-dirty to build anyway."
        );
    }
    Ok(())
}

/// Build the image with the layer cache: Dockerfile → bundle → restore →
/// buildx → rotate.
///
/// Only the build itself is fatal. Cache trouble degrades to a cold build.
pub(crate) async fn build<D: CommandExecutor>(
    input: &PipelineInput<'_>,
    tags: &ImageTags,
    docker: &DockerClient<D>,
) -> anyhow::Result<BuildOutcome> {
    let PipelineInput {
        project_dir,
        config,
        context,
    } = *input;
    let mut steps = Vec::new();

    let dockerfile_content = if eject_mod::is_ejected(project_dir) {
        steps.push("Using ejected Dockerfile".to_owned());
        eject_mod::load_ejected_dockerfile(project_dir)?
    } else {
        let manifest = DependencyManifest::load(project_dir, &config.build.manifest)?;
        let content = DockerfileGenerator::new(config, &manifest).render()?;
        steps.push(format!(
            "Dockerfile generated ({} pinned requirements)",
            manifest.entries.len()
        ));
        content
    };

    let bundle_dir = bundle::create_bundle(project_dir, &dockerfile_content)?;
    steps.push("Source bundled".to_owned());

    let mut cache_degraded = false;
    let store = CacheStore::new(project_dir.join(&config.cache.dir));
    let key = CacheKey::new(&context.os, &config.cache.prefix, &context.run_id);

    let (cache_from, cache_to) = if config.cache.enabled {
        let cache_from = match store.restore(&key) {
            Ok(CacheRestore::Miss) => {
                steps.push("Cache miss; building cold".to_owned());
                None
            }
            Ok(hit) => hit.entry().map(|entry| {
                steps.push(format!("Cache restored from {}", entry.key));
                entry.path.clone()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "cache restore failed; building cold");
                steps.push("Cache restore failed; building cold".to_owned());
                cache_degraded = true;
                None
            }
        };
        let cache_to = match store.staging_dir(&key) {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::warn!(error = %e, "cannot stage cache export; this build will not be cached");
                steps.push("Cache export skipped".to_owned());
                cache_degraded = true;
                None
            }
        };
        (cache_from, cache_to)
    } else {
        steps.push("Cache disabled".to_owned());
        (None, None)
    };

    let request = BuildRequest {
        context: bundle_dir,
        tags: tags.iter().map(ToString::to_string).collect(),
        build_args: dockerfile::build_args(config),
        cache_from,
        cache_to: cache_to.clone(),
    };
    docker.build(&request).await?;
    steps.push(format!("Image built ({})", tags.commit));

    if cache_to.is_some() {
        match store.promote(&key) {
            Ok(entry) => steps.push(format!("Cache rotated to {}", entry.key)),
            Err(e) => {
                tracing::warn!(error = %e, "cache rotation failed; the next build starts cold");
                steps.push("Cache rotation failed".to_owned());
                cache_degraded = true;
            }
        }
    }

    Ok(BuildOutcome {
        steps,
        cache_degraded,
    })
}

/// Run the full deploy pipeline: descriptor → build → login → publish →
/// submit.
///
/// The descriptor is rendered first, so a broken template or config stops
/// the run before anything is built or pushed. Nothing is submitted unless
/// both tags were pushed with one digest.
pub(crate) async fn deploy<D, A>(
    input: &PipelineInput<'_>,
    secrets: &DeploySecrets,
    docker: &DockerClient<D>,
    aws: &AwsClient<A>,
) -> anyhow::Result<DeployOutcome>
where
    D: CommandExecutor,
    A: CommandExecutor,
{
    let config = input.config;
    let region = &config.project.region;
    let mut steps = Vec::new();

    let registry = resolve_registry(config, aws).await?;
    let tags = ImageTags::new(&registry, config.repository(), &input.context.commit_sha);

    let template = match eject_mod::load_ejected_template(input.project_dir)? {
        Some(template) => {
            steps.push("Using ejected deployment template".to_owned());
            template
        }
        None => DEFAULT_TEMPLATE.to_owned(),
    };
    let values = TemplateValues::new(config, &tags, secrets);
    let descriptor = render_descriptor(&template, &values, &config.deploy.env)?;
    steps.push(format!("Deployment descriptor rendered ({})", descriptor.image_ref));
    warn_on_port_mismatch(config);

    let built = build(input, &tags, docker).await?;
    steps.extend(built.steps);

    let password = aws.ecr_login_password(region).await?;
    docker.login(&registry, &password).await?;
    steps.push(format!("Logged in to {registry}"));

    let published = docker.publish(&tags).await?;
    steps.push(format!(
        "Published {} and {} ({})",
        tags.commit, tags.latest, published.digest
    ));

    let receipt = aws.create_deployment(region, &descriptor).await?;
    steps.push(match receipt.version {
        Some(version) => format!(
            "Deployment {version} submitted to {}",
            receipt.service_name
        ),
        None => format!("Deployment submitted to {}", receipt.service_name),
    });

    Ok(DeployOutcome {
        steps,
        published,
        receipt,
        cache_degraded: built.cache_degraded,
    })
}

/// `registry.url` from gantry.toml, or the ECR registry of the active account.
async fn resolve_registry<A: CommandExecutor>(
    config: &GantryConfig,
    aws: &AwsClient<A>,
) -> anyhow::Result<String> {
    if let Some(url) = &config.registry.url {
        return Ok(url.clone());
    }
    let account = aws.account_id().await.map_err(|e| {
        anyhow::anyhow!("cannot determine the ECR registry: set [registry].url or configure AWS credentials ({e})")
    })?;
    Ok(ecr_registry(&account, &config.project.region))
}

/// The server binds `server.http`; Lightsail routes to `deploy.container_port`.
fn warn_on_port_mismatch(config: &GantryConfig) {
    let routed = config.deploy.container_port;
    match config.server_port() {
        Some(bound) if bound != routed => tracing::warn!(
            bound,
            routed,
            "server binds a different port than the public endpoint routes to"
        ),
        _ => {}
    }
}
