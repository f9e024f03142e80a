//! Core types and configuration for gantry.
//!
//! This crate defines the `gantry.toml` schema ([`GantryConfig`]), the
//! pipeline's domain model, dependency manifest loading
//! ([`DependencyManifest`]), the deployment descriptor, and shared error types.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod model;
pub mod secrets;

pub use config::{
    BuildConfig, CacheConfig, DeployConfig, GantryConfig, ProjectConfig, RegistryConfig,
    ServerConfig,
};
pub use descriptor::{DeploymentDescriptor, DeploymentRequest, Protocol};
pub use error::{Error, Result};
pub use manifest::DependencyManifest;
pub use model::{
    ArtifactRef, BuildStage, DeploymentSlot, DeploymentState, HealthCheckPolicy, ImageTag, ImageTags,
    RuntimeIdentity,
};
pub use secrets::DeploySecrets;
