use gantry_cloud::{AwsClient, CheckResult, DockerClient, NamedCheck, RealExecutor};
use gantry_core::{DeploySecrets, GantryConfig};
use std::path::Path;

pub async fn doctor() -> anyhow::Result<()> {
    let project_dir = Path::new(".");
    let mut report =
        gantry_cloud::doctor::check_tools(&DockerClient::new(), &AwsClient::new(), &RealExecutor)
            .await;

    // Without a valid config the secrets are still checked under the default names.
    let (config_file, bucket_name_env) = match GantryConfig::load(project_dir) {
        Ok(config) if project_dir.join("gantry.toml").exists() => {
            (CheckResult::ok("Found"), config.deploy.bucket_name_env)
        }
        Ok(config) => (
            CheckResult::fail("Not found (run gantry init)"),
            config.deploy.bucket_name_env,
        ),
        Err(e) => (
            CheckResult::fail(&format!("{e}")),
            GantryConfig::default().deploy.bucket_name_env,
        ),
    };
    report.config_file = config_file;

    report.secrets = DeploySecrets::required_names(&bucket_name_env)
        .into_iter()
        .map(|name| {
            let set = std::env::var_os(&name).is_some_and(|v| !v.is_empty());
            let result = if set {
                CheckResult::ok("Set")
            } else {
                CheckResult::fail("Not set (export it or add it to .env)")
            };
            NamedCheck { name, result }
        })
        .collect();

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed; see above for details");
    }

    Ok(())
}
