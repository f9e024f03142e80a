//! ECR credentials and Lightsail container-service operations through the
//! `aws` CLI.
//!
//! Deployment submission is fire-and-forget: [`AwsClient::create_deployment`]
//! returns once Lightsail has accepted the request. Convergence is observed
//! separately through [`AwsClient::service_status`].

use gantry_core::{DeploymentDescriptor, DeploymentSlot, DeploymentState};
use secrecy::SecretString;
use serde::Deserialize;

use crate::command::CommandError;
use crate::docker::PublishError;
use crate::executor::{CommandExecutor, RealExecutor, args};

const AWS: &str = "aws";

/// Acknowledgement of a submitted deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub service_name: String,
    /// Always [`DeploymentState::Submitted`] at submission time
    pub state: DeploymentState,
    /// Deployment version, when Lightsail reports one
    pub version: Option<u32>,
}

/// One deployment as Lightsail currently reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedDeployment {
    pub version: Option<u32>,
    /// Raw Lightsail state (`ACTIVATING`, `ACTIVE`, ...)
    pub raw_state: String,
    /// `None` for a state gantry does not know
    pub state: Option<DeploymentState>,
}

/// Snapshot of a container service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service_name: String,
    pub service_state: String,
    pub url: Option<String>,
    pub current: Option<ObservedDeployment>,
    pub next: Option<ObservedDeployment>,
}

// ── Lightsail response shapes ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeploymentResponse {
    container_service: ContainerServiceJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetContainerServicesResponse {
    #[serde(default)]
    container_services: Vec<ContainerServiceJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerServiceJson {
    container_service_name: String,
    #[serde(default)]
    state: String,
    url: Option<String>,
    current_deployment: Option<DeploymentJson>,
    next_deployment: Option<DeploymentJson>,
}

#[derive(Deserialize)]
struct DeploymentJson {
    version: Option<u32>,
    #[serde(default)]
    state: String,
}

impl DeploymentJson {
    fn observe(self, slot: DeploymentSlot) -> ObservedDeployment {
        ObservedDeployment {
            version: self.version,
            state: DeploymentState::from_lightsail(&self.state, slot),
            raw_state: self.state,
        }
    }
}

/// AWS operations client, parameterized over the executor for testability.
pub struct AwsClient<E: CommandExecutor = RealExecutor> {
    executor: E,
}

impl AwsClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for AwsClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> AwsClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// `aws --version` (e.g. `aws-cli/2.15.0 Python/3.11.6 ...`).
    pub async fn version(&self) -> Result<String, CommandError> {
        let out = self.executor.exec(AWS, &args(["--version"])).await?;
        Ok(out.split_whitespace().next().unwrap_or_default().to_owned())
    }

    /// Account id of the active credentials.
    pub async fn account_id(&self) -> Result<String, CommandError> {
        let out = self
            .executor
            .exec(
                AWS,
                &args([
                    "sts",
                    "get-caller-identity",
                    "--query",
                    "Account",
                    "--output",
                    "text",
                ]),
            )
            .await?;
        Ok(out.trim().to_owned())
    }

    // ── ECR ──

    /// Short-lived registry password for `docker login`.
    pub async fn ecr_login_password(&self, region: &str) -> Result<SecretString, PublishError> {
        let out = self
            .executor
            .exec(AWS, &args(["ecr", "get-login-password", "--region", region]))
            .await
            .map_err(|e| PublishError::Credentials { source: e })?;
        Ok(SecretString::from(out.trim().to_owned()))
    }

    // ── Lightsail ──

    /// Submit the descriptor as a new deployment. The JSON body, which
    /// carries secrets, is passed on stdin.
    pub async fn create_deployment(
        &self,
        region: &str,
        descriptor: &DeploymentDescriptor,
    ) -> Result<DeploymentReceipt, DeployError> {
        let body = descriptor.to_json()?;
        let out = self
            .executor
            .exec_with_stdin(
                AWS,
                &args([
                    "lightsail",
                    "create-container-service-deployment",
                    "--region",
                    region,
                    "--cli-input-json",
                    "file:///dev/stdin",
                    "--output",
                    "json",
                ]),
                body.as_bytes(),
            )
            .await
            .map_err(|e| DeployError::Submit { source: e })?;

        let version = if out.trim().is_empty() {
            None
        } else {
            let response: CreateDeploymentResponse =
                serde_json::from_str(&out).map_err(|e| DeployError::InvalidResponse { source: e })?;
            let service = response.container_service;
            service
                .next_deployment
                .or(service.current_deployment)
                .and_then(|d| d.version)
        };

        tracing::info!(service = %descriptor.service_name, ?version, "deployment submitted");
        Ok(DeploymentReceipt {
            service_name: descriptor.service_name.clone(),
            state: DeploymentState::Submitted,
            version,
        })
    }

    /// Current and pending deployments of `service_name`.
    pub async fn service_status(
        &self,
        region: &str,
        service_name: &str,
    ) -> Result<ServiceStatus, DeployError> {
        let out = self
            .executor
            .exec(
                AWS,
                &args([
                    "lightsail",
                    "get-container-services",
                    "--service-name",
                    service_name,
                    "--region",
                    region,
                    "--output",
                    "json",
                ]),
            )
            .await
            .map_err(|e| DeployError::Describe { source: e })?;

        let response: GetContainerServicesResponse =
            serde_json::from_str(&out).map_err(|e| DeployError::InvalidResponse { source: e })?;
        let service = response
            .container_services
            .into_iter()
            .find(|s| s.container_service_name == service_name)
            .ok_or_else(|| DeployError::ServiceNotFound(service_name.to_owned()))?;

        Ok(ServiceStatus {
            service_name: service.container_service_name,
            service_state: service.state,
            url: service.url,
            current: service
                .current_deployment
                .map(|d| d.observe(DeploymentSlot::Current)),
            next: service
                .next_deployment
                .map(|d| d.observe(DeploymentSlot::Next)),
        })
    }
}

/// ECR registry host of an account.
pub fn ecr_registry(account_id: &str, region: &str) -> String {
    format!("{account_id}.dkr.ecr.{region}.amazonaws.com")
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Descriptor(#[from] gantry_core::Error),

    #[error("lightsail rejected the deployment; the previous deployment stays active")]
    Submit { source: CommandError },

    #[error("failed to describe container service")]
    Describe { source: CommandError },

    #[error("unexpected lightsail response")]
    InvalidResponse { source: serde_json::Error },

    #[error("container service '{0}' does not exist")]
    ServiceNotFound(String),
}
