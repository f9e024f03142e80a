use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{HealthCheckPolicy, RuntimeIdentity};

/// gantry.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GantryConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Container service name (defaults to "giftless")
    #[serde(default = "default_service_name")]
    pub name: String,
    /// AWS region of the registry and the container service
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Base image of the disposable builder stage
    #[serde(default = "default_builder_image")]
    pub builder_image: String,
    /// Base image of the runtime stage
    #[serde(default = "default_runtime_image")]
    pub runtime_image: String,
    /// uWSGI version pinned into the wheel set (`SERVER_VERSION` build arg)
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Unprivileged user the server runs as (`USER_NAME` build arg)
    #[serde(default = "default_execution_user_name")]
    pub execution_user_name: String,
    /// Middleware packages installed before the identity switch (`EXTRA_PACKAGES` build arg)
    #[serde(default = "default_extra_middleware_packages")]
    pub extra_middleware_packages: Vec<String>,
    /// Dependency manifest, relative to the project directory
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    /// Native toolchain installed only in the builder stage
    #[serde(default = "default_build_packages")]
    pub build_packages: Vec<String>,
    /// Shared libraries the runtime stage needs
    #[serde(default = "default_runtime_libraries")]
    pub runtime_libraries: Vec<String>,
    /// Where application source lives inside the image
    #[serde(default = "default_app_root")]
    pub app_root: String,
    /// Environment variable naming the WSGI module
    #[serde(default = "default_entrypoint_module_var")]
    pub entrypoint_module_var: String,
    /// Dotted path of the WSGI entrypoint module
    #[serde(default = "default_entrypoint_module")]
    pub entrypoint_module: String,
    /// Static environment variables baked into the runtime image.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Default arguments handed to the process supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http")]
    pub http: String,
    #[serde(default = "default_processes")]
    pub processes: u32,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_callable")]
    pub callable: String,
    #[serde(default = "default_true")]
    pub manage_script_name: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding buildx layer cache entries
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Fixed key prefix; the full key is `<os>-<prefix>-<run_id>`
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry host, e.g. `123456789012.dkr.ecr.us-east-1.amazonaws.com`
    pub url: Option<String>,
    /// Repository name (defaults to the service name)
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default = "default_success_codes")]
    pub success_codes: BTreeSet<u16>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,
    /// Environment variable holding the storage bucket name
    #[serde(default = "default_bucket_name_env")]
    pub bucket_name_env: String,
    /// Extra container environment merged into the descriptor.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            region: default_region(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            builder_image: default_builder_image(),
            runtime_image: default_runtime_image(),
            server_version: default_server_version(),
            execution_user_name: default_execution_user_name(),
            extra_middleware_packages: default_extra_middleware_packages(),
            manifest: default_manifest(),
            build_packages: default_build_packages(),
            runtime_libraries: default_runtime_libraries(),
            app_root: default_app_root(),
            entrypoint_module_var: default_entrypoint_module_var(),
            entrypoint_module: default_entrypoint_module(),
            env: HashMap::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: default_http(),
            processes: default_processes(),
            threads: default_threads(),
            callable: default_callable(),
            manage_script_name: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            prefix: default_cache_prefix(),
            enabled: true,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            container_port: default_container_port(),
            health_check_path: default_health_check_path(),
            success_codes: default_success_codes(),
            interval_seconds: default_interval_seconds(),
            timeout_seconds: default_timeout_seconds(),
            healthy_threshold: default_threshold(),
            unhealthy_threshold: default_threshold(),
            bucket_name_env: default_bucket_name_env(),
            env: HashMap::new(),
        }
    }
}

impl GantryConfig {
    /// Load from gantry.toml at the given path, or return defaults if not found.
    ///
    /// The loaded config is validated before it is returned.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join("gantry.toml");
        let config: Self = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })?
        } else {
            tracing::debug!("no gantry.toml found; using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.runtime_identity()?;

        if self.server.processes == 0 {
            return Err(invalid("server.processes", "must be at least 1"));
        }
        if self.server.threads == 0 {
            return Err(invalid("server.threads", "must be at least 1"));
        }
        if self.deploy.container_port == 0 {
            return Err(invalid("deploy.container_port", "must be non-zero"));
        }
        if self.cache.prefix.is_empty() {
            return Err(invalid("cache.prefix", "must not be empty"));
        }
        self.health_check().validate()
    }

    /// The identity the runtime stage switches to.
    pub fn runtime_identity(&self) -> crate::Result<RuntimeIdentity> {
        RuntimeIdentity::new(&self.build.execution_user_name, &self.build.app_root)
    }

    pub fn health_check(&self) -> HealthCheckPolicy {
        HealthCheckPolicy {
            path: self.deploy.health_check_path.clone(),
            success_codes: self.deploy.success_codes.clone(),
            interval_seconds: self.deploy.interval_seconds,
            timeout_seconds: self.deploy.timeout_seconds,
            healthy_threshold: self.deploy.healthy_threshold,
            unhealthy_threshold: self.deploy.unhealthy_threshold,
        }
    }

    /// Repository name inside the registry.
    pub fn repository(&self) -> &str {
        self.registry
            .repository
            .as_deref()
            .unwrap_or(&self.project.name)
    }

    /// Port of `server.http`; `None` when the bind address has no numeric port.
    pub fn server_port(&self) -> Option<u16> {
        let (_, port) = self.server.http.rsplit_once(':')?;
        match port.parse::<u16>() {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!(http = %self.server.http, error = %e, "bind address has no numeric port");
                None
            }
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> crate::Error {
    crate::Error::InvalidConfig {
        field,
        reason: reason.to_owned(),
    }
}

fn default_service_name() -> String {
    "giftless".to_owned()
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_builder_image() -> String {
    "python:3.7".to_owned()
}

fn default_runtime_image() -> String {
    "python:3.7-slim".to_owned()
}

fn default_server_version() -> String {
    "2.0.18".to_owned()
}

fn default_execution_user_name() -> String {
    "giftless".to_owned()
}

fn default_extra_middleware_packages() -> Vec<String> {
    vec!["wsgi_cors_middleware".to_owned()]
}

fn default_manifest() -> PathBuf {
    PathBuf::from("requirements.txt")
}

fn default_build_packages() -> Vec<String> {
    ["build-essential", "libpcre3-dev", "libxml2-dev"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_runtime_libraries() -> Vec<String> {
    ["libpcre3", "libxml2", "tini"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_app_root() -> String {
    "/app".to_owned()
}

fn default_entrypoint_module_var() -> String {
    "UWSGI_MODULE".to_owned()
}

fn default_entrypoint_module() -> String {
    "giftless.wsgi_entrypoint".to_owned()
}

fn default_http() -> String {
    "0.0.0.0:80".to_owned()
}

fn default_processes() -> u32 {
    2
}

fn default_threads() -> u32 {
    2
}

fn default_callable() -> String {
    "app".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/.buildx-cache")
}

fn default_cache_prefix() -> String {
    "buildx".to_owned()
}

fn default_container_name() -> String {
    "giftless".to_owned()
}

fn default_container_port() -> u16 {
    8080
}

fn default_health_check_path() -> String {
    "/health".to_owned()
}

fn default_success_codes() -> BTreeSet<u16> {
    BTreeSet::from([200])
}

fn default_interval_seconds() -> u32 {
    5
}

fn default_timeout_seconds() -> u32 {
    2
}

fn default_threshold() -> u32 {
    2
}

fn default_bucket_name_env() -> String {
    "BUCKET_NAME".to_owned()
}
