use gantry_cloud::{AwsClient, ObservedDeployment};
use gantry_core::GantryConfig;
use std::path::PathBuf;

pub async fn status() -> anyhow::Result<()> {
    let config = GantryConfig::load(&PathBuf::from("."))?;
    let client = AwsClient::new();
    let status = client
        .service_status(&config.project.region, &config.project.name)
        .await?;

    println!("Service:  {} ({})", status.service_name, status.service_state);
    if let Some(url) = &status.url {
        println!("URL:      {url}");
    }
    println!("Current:  {}", describe(status.current.as_ref()));
    println!("Pending:  {}", describe(status.next.as_ref()));
    Ok(())
}

fn describe(deployment: Option<&ObservedDeployment>) -> String {
    let Some(d) = deployment else {
        return "none".to_owned();
    };
    let version = d
        .version
        .map_or_else(|| "?".to_owned(), |v| v.to_string());
    match d.state {
        Some(state) => format!("version {version}, {state} ({})", d.raw_state),
        None => format!("version {version}, {}", d.raw_state),
    }
}
