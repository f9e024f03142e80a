//! External tool integrations for gantry: `docker` for building and
//! publishing images, `aws` for ECR credentials and Lightsail deployments.
//!
//! Every client is generic over [`CommandExecutor`] so the pipeline can be
//! driven by a mock in tests.

pub mod aws;
pub mod command;
pub mod docker;
pub mod doctor;
pub mod executor;

pub use aws::{AwsClient, DeployError, DeploymentReceipt, ObservedDeployment, ServiceStatus};
pub use command::CommandError;
pub use docker::{BuildRequest, DockerClient, ImageBuildError, PublishError, PublishedImage};
pub use doctor::{CheckResult, DoctorReport, NamedCheck};
pub use executor::{CommandExecutor, RealExecutor};
