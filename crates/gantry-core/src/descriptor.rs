//! Declarative deployment descriptor and its wire shape.
//!
//! [`DeploymentRequest`] mirrors the JSON accepted by
//! `aws lightsail create-container-service-deployment --cli-input-json`.
//! [`DeploymentDescriptor`] is the validated form the pipeline works with.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{HealthCheckPolicy, parse_code_ranges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub service_name: String,
    pub container_name: String,
    /// `registry/repository:tag`
    pub image_ref: String,
    pub environment: BTreeMap<String, String>,
    pub port_mappings: BTreeMap<u16, Protocol>,
    /// Port the public endpoint routes to
    pub container_port: u16,
    pub health_check: HealthCheckPolicy,
}

// Environment values carry credentials; keep them out of logs.
impl fmt::Debug for DeploymentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&String> = self.environment.keys().collect();
        f.debug_struct("DeploymentDescriptor")
            .field("service_name", &self.service_name)
            .field("container_name", &self.container_name)
            .field("image_ref", &self.image_ref)
            .field("environment", &env_keys)
            .field("port_mappings", &self.port_mappings)
            .field("container_port", &self.container_port)
            .field("health_check", &self.health_check)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub service_name: String,
    pub containers: BTreeMap<String, ContainerSpec>,
    pub public_endpoint: PublicEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: BTreeMap<String, Protocol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEndpoint {
    pub container_name: String,
    pub container_port: u16,
    pub health_check: HealthCheckSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    pub timeout_seconds: u32,
    pub interval_seconds: u32,
    pub path: String,
    pub success_codes: String,
}

impl DeploymentDescriptor {
    /// Merge extra environment; values already present in the template win.
    pub fn merge_environment(&mut self, extra: &HashMap<String, String>) {
        for (key, value) in extra {
            self.environment
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn to_request(&self) -> DeploymentRequest {
        let container = ContainerSpec {
            image: self.image_ref.clone(),
            environment: self.environment.clone(),
            ports: self
                .port_mappings
                .iter()
                .map(|(port, proto)| (port.to_string(), *proto))
                .collect(),
        };
        let hc = &self.health_check;
        DeploymentRequest {
            service_name: self.service_name.clone(),
            containers: BTreeMap::from([(self.container_name.clone(), container)]),
            public_endpoint: PublicEndpoint {
                container_name: self.container_name.clone(),
                container_port: self.container_port,
                health_check: HealthCheckSpec {
                    healthy_threshold: hc.healthy_threshold,
                    unhealthy_threshold: hc.unhealthy_threshold,
                    timeout_seconds: hc.timeout_seconds,
                    interval_seconds: hc.interval_seconds,
                    path: hc.path.clone(),
                    success_codes: hc.success_codes_spec(),
                },
            },
        }
    }

    /// JSON body for `--cli-input-json`.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(&self.to_request()).map_err(crate::Error::DescriptorEncode)
    }

    /// Same as [`to_json`](Self::to_json) with every environment value masked.
    pub fn to_redacted_json(&self) -> crate::Result<String> {
        let mut redacted = self.clone();
        for value in redacted.environment.values_mut() {
            *value = "***".to_owned();
        }
        redacted.to_json()
    }
}

impl TryFrom<DeploymentRequest> for DeploymentDescriptor {
    type Error = crate::Error;

    fn try_from(request: DeploymentRequest) -> crate::Result<Self> {
        let bad = |reason: String| crate::Error::InvalidDescriptor(reason);

        if request.service_name.trim().is_empty() {
            return Err(bad("serviceName is empty".to_owned()));
        }
        if request.containers.len() != 1 {
            return Err(bad(format!(
                "expected exactly one container, found {}",
                request.containers.len()
            )));
        }
        let endpoint = request.public_endpoint;
        let Some((container_name, container)) = request.containers.into_iter().next() else {
            return Err(bad("no container defined".to_owned()));
        };
        if endpoint.container_name != container_name {
            return Err(bad(format!(
                "public endpoint targets container '{}' but only '{container_name}' is defined",
                endpoint.container_name
            )));
        }
        if container.image.trim().is_empty() {
            return Err(bad(format!("container '{container_name}' has no image")));
        }

        let mut port_mappings = BTreeMap::new();
        for (port, proto) in container.ports {
            let port: u16 = port
                .parse()
                .map_err(|e| bad(format!("port {port:?} is not a number: {e}")))?;
            port_mappings.insert(port, proto);
        }
        if !port_mappings.contains_key(&endpoint.container_port) {
            return Err(bad(format!(
                "public endpoint port {} is not open on container '{container_name}'",
                endpoint.container_port
            )));
        }

        let hc = endpoint.health_check;
        let success_codes = parse_code_ranges(&hc.success_codes)
            .map_err(|e| bad(format!("malformed successCodes: {e}")))?;
        let health_check = HealthCheckPolicy {
            path: hc.path,
            success_codes,
            interval_seconds: hc.interval_seconds,
            timeout_seconds: hc.timeout_seconds,
            healthy_threshold: hc.healthy_threshold,
            unhealthy_threshold: hc.unhealthy_threshold,
        };
        health_check.validate()?;

        Ok(Self {
            service_name: request.service_name,
            container_name,
            image_ref: container.image,
            environment: container.environment,
            port_mappings,
            container_port: endpoint.container_port,
            health_check,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn request_json(port_key: &str, endpoint_port: u16) -> String {
        format!(
            r#"{{
  "serviceName": "giftless",
  "containers": {{
    "giftless": {{
      "image": "reg/giftless:abc",
      "environment": {{"BUCKET_NAME": "lfs-bucket"}},
      "ports": {{"{port_key}": "HTTP"}}
    }}
  }},
  "publicEndpoint": {{
    "containerName": "giftless",
    "containerPort": {endpoint_port},
    "healthCheck": {{
      "healthyThreshold": 2,
      "unhealthyThreshold": 2,
      "timeoutSeconds": 2,
      "intervalSeconds": 5,
      "path": "/health",
      "successCodes": "200"
    }}
  }}
}}"#
        )
    }

    fn parse(json: &str) -> crate::Result<DeploymentDescriptor> {
        let request: DeploymentRequest = serde_json::from_str(json).unwrap();
        DeploymentDescriptor::try_from(request)
    }

    #[test]
    fn valid_request_converts() {
        let d = parse(&request_json("8080", 8080)).unwrap();
        assert_eq!(d.container_port, 8080);
        assert_eq!(d.port_mappings.get(&8080), Some(&Protocol::Http));
        assert_eq!(d.health_check.success_codes, BTreeSet::from([200]));
        assert_eq!(d.environment["BUCKET_NAME"], "lfs-bucket");
    }

    #[test]
    fn endpoint_port_must_be_open() {
        let err = parse(&request_json("80", 8080)).unwrap_err();
        assert!(err.to_string().contains("8080"), "got: {err}");
    }

    #[test]
    fn request_shape_survives_conversion() {
        let d = parse(&request_json("8080", 8080)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        assert_eq!(value["publicEndpoint"]["containerPort"], 8080);
        assert_eq!(value["publicEndpoint"]["healthCheck"]["path"], "/health");
        assert_eq!(value["containers"]["giftless"]["ports"]["8080"], "HTTP");
    }

    #[test]
    fn debug_and_redacted_json_hide_values() {
        let d = parse(&request_json("8080", 8080)).unwrap();
        assert!(!format!("{d:?}").contains("lfs-bucket"));
        assert!(!d.to_redacted_json().unwrap().contains("lfs-bucket"));
        assert!(d.to_json().unwrap().contains("lfs-bucket"));
    }

    #[test]
    fn merge_keeps_template_values() {
        let mut d = parse(&request_json("8080", 8080)).unwrap();
        let extra = HashMap::from([
            ("BUCKET_NAME".to_owned(), "other".to_owned()),
            ("GIFTLESS_DEBUG".to_owned(), "1".to_owned()),
        ]);
        d.merge_environment(&extra);
        assert_eq!(d.environment["BUCKET_NAME"], "lfs-bucket");
        assert_eq!(d.environment["GIFTLESS_DEBUG"], "1");
    }
}
