//! Deployment descriptor templates.
//!
//! A template is the JSON body of `create-container-service-deployment`
//! with `${name}` placeholders. Rendering substitutes the recognized
//! options, parses the result into a [`DeploymentRequest`] and validates it
//! into a [`DeploymentDescriptor`].

use std::collections::HashMap;

use gantry_core::{DeploySecrets, DeploymentDescriptor, DeploymentRequest, GantryConfig, ImageTags};
use secrecy::{ExposeSecret, SecretString};

/// Built-in Lightsail deployment template.
pub const DEFAULT_TEMPLATE: &str = r#"{
  "serviceName": "${service_name}",
  "containers": {
    "${container_name}": {
      "image": "${repository_location}:${commit_sha}",
      "environment": {
        "BUCKET_NAME": "${bucket_name_secret}",
        "AWS_ACCESS_KEY_ID": "${aws_access_key_id}",
        "AWS_SECRET_ACCESS_KEY": "${aws_secret_access_key}"
      },
      "ports": {
        "${container_port}": "HTTP"
      }
    }
  },
  "publicEndpoint": {
    "containerName": "${container_name}",
    "containerPort": ${container_port},
    "healthCheck": {
      "healthyThreshold": ${healthy_threshold},
      "unhealthyThreshold": ${unhealthy_threshold},
      "timeoutSeconds": ${timeout_seconds},
      "intervalSeconds": ${interval_seconds},
      "path": "${health_check_path}",
      "successCodes": "${success_codes}"
    }
  }
}
"#;

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct TemplateValues {
    pub service_name: String,
    pub container_name: String,
    pub repository_location: String,
    pub commit_sha: String,
    pub bucket_name_secret: SecretString,
    pub aws_access_key_id: SecretString,
    pub aws_secret_access_key: SecretString,
    pub health_check_path: String,
    pub container_port: u16,
    pub success_codes: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

enum Value<'a> {
    Text(&'a str),
    Number(u64),
}

impl TemplateValues {
    pub fn new(config: &GantryConfig, tags: &ImageTags, secrets: &DeploySecrets) -> Self {
        let deploy = &config.deploy;
        let health = config.health_check();
        Self {
            service_name: config.project.name.clone(),
            container_name: deploy.container_name.clone(),
            repository_location: tags.repository_location(),
            commit_sha: tags.commit.tag.clone(),
            bucket_name_secret: secrets.bucket_name.clone(),
            aws_access_key_id: secrets.aws_access_key_id.clone(),
            aws_secret_access_key: secrets.aws_secret_access_key.clone(),
            health_check_path: health.path.clone(),
            container_port: deploy.container_port,
            success_codes: health.success_codes_spec(),
            interval_seconds: health.interval_seconds,
            timeout_seconds: health.timeout_seconds,
            healthy_threshold: health.healthy_threshold,
            unhealthy_threshold: health.unhealthy_threshold,
        }
    }

    fn lookup(&self, name: &str) -> Option<Value<'_>> {
        Some(match name {
            "service_name" => Value::Text(&self.service_name),
            "container_name" => Value::Text(&self.container_name),
            "repository_location" => Value::Text(&self.repository_location),
            "commit_sha" => Value::Text(&self.commit_sha),
            "bucket_name_secret" => Value::Text(self.bucket_name_secret.expose_secret()),
            "aws_access_key_id" => Value::Text(self.aws_access_key_id.expose_secret()),
            "aws_secret_access_key" => Value::Text(self.aws_secret_access_key.expose_secret()),
            "health_check_path" => Value::Text(&self.health_check_path),
            "success_codes" => Value::Text(&self.success_codes),
            "container_port" => Value::Number(self.container_port.into()),
            "interval_seconds" => Value::Number(self.interval_seconds.into()),
            "timeout_seconds" => Value::Number(self.timeout_seconds.into()),
            "healthy_threshold" => Value::Number(self.healthy_threshold.into()),
            "unhealthy_threshold" => Value::Number(self.unhealthy_threshold.into()),
            _ => return None,
        })
    }
}

/// Substitute every `${name}` in `template`.
///
/// Text values are JSON-escaped, so a template places them inside quotes.
/// A `$` not followed by `{` is copied through.
pub fn substitute(template: &str, values: &TemplateValues) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(TemplateError::Unterminated {
                offset: template.len() - rest.len() + start,
            });
        };
        let name = after[..end].trim();
        match values.lookup(name) {
            Some(Value::Text(text)) => out.push_str(&json_escape(text)),
            Some(Value::Number(n)) => out.push_str(&n.to_string()),
            None => {
                return Err(TemplateError::UnknownPlaceholder {
                    name: name.to_owned(),
                });
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Render `template` into a validated descriptor, then merge `extra_env`
/// (`[deploy.env]`) under the template's own environment.
pub fn render_descriptor(
    template: &str,
    values: &TemplateValues,
    extra_env: &HashMap<String, String>,
) -> Result<DeploymentDescriptor, TemplateError> {
    let json = substitute(template, values)?;
    let request: DeploymentRequest = serde_json::from_str(&json).map_err(TemplateError::Parse)?;
    let mut descriptor = DeploymentDescriptor::try_from(request)?;
    descriptor.merge_environment(extra_env);
    tracing::debug!(
        service = %descriptor.service_name,
        image = %descriptor.image_ref,
        "deployment descriptor rendered"
    );
    Ok(descriptor)
}

/// String contents as they appear between JSON quotes.
fn json_escape(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_owned()).to_string();
    quoted[1..quoted.len() - 1].to_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template placeholder ${{{name}}}")]
    UnknownPlaceholder { name: String },

    #[error("unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },

    #[error("rendered template is not a valid deployment request")]
    Parse(#[source] serde_json::Error),

    #[error(transparent)]
    Descriptor(#[from] gantry_core::Error),
}
