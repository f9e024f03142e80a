use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("execution user must not be '{0}'; the server never runs as root")]
    PrivilegedIdentity(String),

    // ── Dependency manifest ──
    #[error("dependency manifest not found at {path}")]
    ManifestMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: requirement {entry:?} is not pinned as name==version")]
    UnpinnedRequirement {
        path: PathBuf,
        line: usize,
        entry: String,
    },

    #[error("{path}:{line}: {name} is pinned twice ({first} and {second})")]
    ConflictingPins {
        path: PathBuf,
        line: usize,
        name: String,
        first: String,
        second: String,
    },

    // ── Deployment descriptor ──
    #[error("invalid deployment descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("failed to encode deployment descriptor")]
    DescriptorEncode(#[source] serde_json::Error),

    // ── Secrets ──
    #[error("secret {name} is not set; export it or add it to .env")]
    MissingSecret { name: String },
}
