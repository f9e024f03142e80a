use std::fmt;

use crate::aws::AwsClient;
use crate::docker::DockerClient;
use crate::executor::{CommandExecutor, args};

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

/// A named check outside the fixed tool set (one per required secret).
#[derive(Debug, Clone)]
pub struct NamedCheck {
    pub name: String,
    pub result: CheckResult,
}

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub docker: CheckResult,
    pub buildx: CheckResult,
    pub aws: CheckResult,
    pub git: CheckResult,
    pub config_file: CheckResult,
    pub secrets: Vec<NamedCheck>,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.docker.passed
            && self.buildx.passed
            && self.aws.passed
            && self.git.passed
            && self.config_file.passed
            && self.secrets.iter().all(|s| s.result.passed)
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "gantry doctor")?;
        row(f, "docker", &self.docker)?;
        row(f, "docker buildx", &self.buildx)?;
        row(f, "aws CLI", &self.aws)?;
        row(f, "git", &self.git)?;
        row(f, "gantry.toml", &self.config_file)?;
        for secret in &self.secrets {
            row(f, &secret.name, &secret.result)?;
        }
        Ok(())
    }
}

fn row(f: &mut fmt::Formatter<'_>, name: &str, result: &CheckResult) -> fmt::Result {
    writeln!(f, "  [{}] {name:<24} {}", result.icon(), result.detail)
}

/// Check the external tools the pipeline shells out to. Every check runs;
/// a failing one does not stop the rest.
///
/// `config_file` and `secrets` are left for the caller, which knows the
/// project directory and environment.
pub async fn check_tools<D, A, G>(
    docker: &DockerClient<D>,
    aws: &AwsClient<A>,
    git: &G,
) -> DoctorReport
where
    D: CommandExecutor,
    A: CommandExecutor,
    G: CommandExecutor,
{
    let mut report = DoctorReport::default();

    report.docker = match docker.version().await {
        Ok(v) if !v.is_empty() => CheckResult::ok(&v),
        Ok(_) => CheckResult::fail("daemon not reachable"),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    report.buildx = match docker.buildx_version().await {
        Ok(v) => CheckResult::ok(&v),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    report.aws = match aws.version().await {
        Ok(v) => match aws.account_id().await {
            Ok(account) => CheckResult::ok(&format!("{v} (account {account})")),
            Err(e) => CheckResult::fail(&format!("{v}; no valid credentials: {e}")),
        },
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    report.git = match git.exec("git", &args(["--version"])).await {
        Ok(v) => CheckResult::ok(v.trim()),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_check() {
        let report = DoctorReport {
            docker: CheckResult::ok("24.0.7"),
            buildx: CheckResult::ok("v0.12.0"),
            aws: CheckResult::fail("not found"),
            git: CheckResult::ok("git version 2.43.0"),
            config_file: CheckResult::ok("Found"),
            secrets: vec![NamedCheck {
                name: "BUCKET_NAME".to_owned(),
                result: CheckResult::fail("not set"),
            }],
        };
        let out = report.to_string();
        assert!(out.contains("[OK] docker"));
        assert!(out.contains("[NG] aws CLI"));
        assert!(out.contains("[NG] BUCKET_NAME"));
        assert!(!report.all_passed());
    }
}
