use secrecy::SecretString;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Values injected into the container environment at deploy time.
///
/// The credential pair ends up in the deployment descriptor, so the running
/// service can reach the storage bucket.
#[derive(Debug, Clone)]
pub struct DeploySecrets {
    pub bucket_name: SecretString,
    pub aws_access_key_id: SecretString,
    pub aws_secret_access_key: SecretString,
}

impl DeploySecrets {
    /// Read the secrets from the process environment.
    pub fn from_env(bucket_name_env: &str) -> crate::Result<Self> {
        Self::from_lookup(bucket_name_env, |name| {
            std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
        })
    }

    /// Read the secrets through `lookup`; empty values count as missing.
    pub fn from_lookup<F>(bucket_name_env: &str, lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> crate::Result<SecretString> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
                .ok_or_else(|| crate::Error::MissingSecret {
                    name: name.to_owned(),
                })
        };
        Ok(Self {
            bucket_name: get(bucket_name_env)?,
            aws_access_key_id: get(AWS_ACCESS_KEY_ID)?,
            aws_secret_access_key: get(AWS_SECRET_ACCESS_KEY)?,
        })
    }

    /// Names of the variables [`from_env`](Self::from_env) needs.
    pub fn required_names(bucket_name_env: &str) -> [String; 3] {
        [
            bucket_name_env.to_owned(),
            AWS_ACCESS_KEY_ID.to_owned(),
            AWS_SECRET_ACCESS_KEY.to_owned(),
        ]
    }
}
