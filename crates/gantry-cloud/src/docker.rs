//! Image build and registry publishing through the `docker` CLI.

use std::path::{Path, PathBuf};

use gantry_core::{ImageTag, ImageTags};
use secrecy::{ExposeSecret, SecretString};

use crate::command::CommandError;
use crate::executor::{CommandExecutor, RealExecutor, args};

const DOCKER: &str = "docker";

/// Inputs of one `docker buildx build`.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build context; must contain the Dockerfile
    pub context: PathBuf,
    pub tags: Vec<String>,
    pub build_args: Vec<(String, String)>,
    /// Restored cache entry, if any
    pub cache_from: Option<PathBuf>,
    /// Staging directory the new cache is exported into
    pub cache_to: Option<PathBuf>,
}

impl BuildRequest {
    /// Arguments after `docker`.
    pub fn to_args(&self) -> Result<Vec<String>, ImageBuildError> {
        let context = path_str(&self.context)?;
        let dockerfile = self.context.join("Dockerfile");

        let mut cmd = args(["buildx", "build", "--load", "--file"]);
        cmd.push(path_str(&dockerfile)?.to_owned());
        for tag in &self.tags {
            cmd.push("--tag".to_owned());
            cmd.push(tag.clone());
        }
        for (key, value) in &self.build_args {
            cmd.push("--build-arg".to_owned());
            cmd.push(format!("{key}={value}"));
        }
        if let Some(src) = &self.cache_from {
            cmd.push("--cache-from".to_owned());
            cmd.push(format!("type=local,src={}", path_str(src)?));
        }
        if let Some(dest) = &self.cache_to {
            cmd.push("--cache-to".to_owned());
            cmd.push(format!("type=local,dest={},mode=max", path_str(dest)?));
        }
        cmd.push(context.to_owned());
        Ok(cmd)
    }
}

fn path_str(path: &Path) -> Result<&str, ImageBuildError> {
    path.to_str()
        .ok_or_else(|| ImageBuildError::InvalidPath(path.to_path_buf()))
}

/// Both tags of a successful publish and the digest they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub tags: ImageTags,
    pub digest: String,
}

/// Docker operations client, parameterized over the executor for testability.
pub struct DockerClient<E: CommandExecutor = RealExecutor> {
    executor: E,
}

impl DockerClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> DockerClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Docker server version.
    pub async fn version(&self) -> Result<String, CommandError> {
        let out = self
            .executor
            .exec(DOCKER, &args(["version", "--format", "{{.Server.Version}}"]))
            .await?;
        Ok(out.trim().to_owned())
    }

    pub async fn buildx_version(&self) -> Result<String, CommandError> {
        let out = self
            .executor
            .exec(DOCKER, &args(["buildx", "version"]))
            .await?;
        Ok(out.trim().to_owned())
    }

    // ── Build ──

    /// Build and load the image. Output streams to the terminal.
    pub async fn build(&self, request: &BuildRequest) -> Result<(), ImageBuildError> {
        let cmd = request.to_args()?;
        tracing::info!(tags = ?request.tags, "building image");
        self.executor
            .exec_streaming(DOCKER, &cmd)
            .await
            .map_err(|e| ImageBuildError::Build { source: e })
    }

    // ── Registry ──

    /// `docker login` with the password on stdin.
    pub async fn login(&self, registry: &str, password: &SecretString) -> Result<(), PublishError> {
        self.executor
            .exec_with_stdin(
                DOCKER,
                &args(["login", "--username", "AWS", "--password-stdin", registry]),
                password.expose_secret().as_bytes(),
            )
            .await
            .map_err(|e| PublishError::Login {
                registry: registry.to_owned(),
                source: e,
            })?;
        Ok(())
    }

    /// Push one tag and return the digest the registry reported.
    pub async fn push(&self, tag: &ImageTag) -> Result<String, PublishError> {
        let tag_ref = tag.to_string();
        let out = self
            .executor
            .exec(DOCKER, &args(["push", &tag_ref]))
            .await
            .map_err(|e| PublishError::Push {
                tag: tag_ref.clone(),
                source: e,
            })?;
        let digest = parse_push_digest(&out)
            .ok_or_else(|| PublishError::MissingDigest { tag: tag_ref.clone() })?;
        tracing::debug!(tag = %tag_ref, digest = %digest, "pushed");
        Ok(digest)
    }

    /// Push the commit tag then `latest`; both must resolve to one digest.
    ///
    /// The first failure stops the publish. A re-run pushes both again.
    pub async fn publish(&self, tags: &ImageTags) -> Result<PublishedImage, PublishError> {
        let commit = self.push(&tags.commit).await?;
        let latest = self.push(&tags.latest).await?;
        if commit != latest {
            return Err(PublishError::DigestMismatch { commit, latest });
        }
        tracing::info!(digest = %commit, "image published");
        Ok(PublishedImage {
            tags: tags.clone(),
            digest: commit,
        })
    }
}

/// Extract `sha256:<hex>` from `docker push` output
/// (`latest: digest: sha256:... size: 1234`).
pub fn parse_push_digest(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        let (_, rest) = line.split_once("digest: ")?;
        let digest = rest.split_whitespace().next()?;
        let hex = digest.strip_prefix("sha256:")?;
        (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| digest.to_owned())
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ImageBuildError {
    #[error("build context path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("docker buildx build failed")]
    Build { source: CommandError },
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to fetch registry credentials")]
    Credentials { source: CommandError },

    #[error("docker login to {registry} failed")]
    Login {
        registry: String,
        source: CommandError,
    },

    #[error("push of {tag} failed")]
    Push { tag: String, source: CommandError },

    #[error("push of {tag} did not report a content digest")]
    MissingDigest { tag: String },

    #[error("tags diverged: commit tag is {commit}, latest is {latest}")]
    DigestMismatch { commit: String, latest: String },
}
