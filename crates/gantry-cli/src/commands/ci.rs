use gantry_core::{DeploySecrets, GantryConfig};
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub(super) const WORKFLOW_PATH: &str = ".github/workflows/gantry-deploy.yml";

/// Write the GitHub Actions workflow that deploys on every push to main.
pub async fn ci_init() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");

    // ── Guard: workflow already exists ──
    let workflow_path = project_dir.join(WORKFLOW_PATH);
    if workflow_path.exists() {
        anyhow::bail!(
            "Workflow already exists at {WORKFLOW_PATH}; edit it directly, or delete it to re-run ci init"
        );
    }

    let config = GantryConfig::load(&project_dir)?;

    let github_repo = match detect_github_repo(&project_dir).await {
        Ok(repo) => {
            println!("Repository: {repo}");
            Some(repo)
        }
        Err(e) => {
            tracing::debug!(error = %e, "no GitHub remote detected");
            None
        }
    };

    if let Some(parent) = workflow_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&workflow_path, generate_workflow_yaml(&config))?;
    println!("Created {WORKFLOW_PATH}");

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Add these repository secrets:");
    for name in DeploySecrets::required_names(&config.deploy.bucket_name_env) {
        println!("     {name}");
    }
    match &github_repo {
        Some(repo) => println!("     https://github.com/{repo}/settings/secrets/actions"),
        None => println!("     (GitHub: Settings > Secrets and variables > Actions)"),
    }
    println!();
    println!("  2. Commit and push:");
    println!("     git add {WORKFLOW_PATH}");
    println!("     git commit -m \"Add gantry deploy workflow\"");
    println!("     git push");
    println!();
    println!("Push to main -> build, publish to ECR and deploy to Lightsail.");

    Ok(())
}

/// Detect the GitHub owner/repo from the git remote origin URL.
async fn detect_github_repo(project_dir: &Path) -> anyhow::Result<String> {
    let output = tokio::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!("No git remote 'origin' found");
    }

    let url = String::from_utf8(output.stdout)?.trim().to_owned();
    parse_github_repo(&url)
        .ok_or_else(|| anyhow::anyhow!("Remote '{url}' is not a GitHub repository"))
}

/// Parse "owner/repo" from various GitHub URL formats.
fn parse_github_repo(url: &str) -> Option<String> {
    // SSH: git@github.com:owner/repo.git
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        let repo = rest.strip_suffix(".git").unwrap_or(rest);
        return Some(repo.to_owned());
    }

    // HTTPS: https://github.com/owner/repo.git
    if let Some(rest) = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
    {
        let repo = rest.strip_suffix(".git").unwrap_or(rest);
        let repo = repo.strip_suffix('/').unwrap_or(repo);
        return Some(repo.to_owned());
    }

    None
}

const WORKFLOW_TEMPLATE: &str = r#"# Generated by: gantry ci init
name: Deploy

on:
  push:
    branches: [main]

jobs:
  deploy:
    runs-on: ubuntu-latest
    permissions:
      contents: read
    env:
      AWS_ACCESS_KEY_ID: ${{ secrets.AWS_ACCESS_KEY_ID }}
      AWS_SECRET_ACCESS_KEY: ${{ secrets.AWS_SECRET_ACCESS_KEY }}
      @BUCKET_ENV@: ${{ secrets.@BUCKET_ENV@ }}

    steps:
      - uses: actions/checkout@v4

      - uses: aws-actions/configure-aws-credentials@v4
        with:
          aws-access-key-id: ${{ secrets.AWS_ACCESS_KEY_ID }}
          aws-secret-access-key: ${{ secrets.AWS_SECRET_ACCESS_KEY }}
          aws-region: @REGION@

      - uses: docker/setup-buildx-action@v3

      - name: Cache Docker layers
        uses: actions/cache@v4
        with:
          path: @CACHE_DIR@
          key: ${{ runner.os }}-@CACHE_PREFIX@-${{ github.sha }}
          restore-keys: |
            ${{ runner.os }}-@CACHE_PREFIX@-

      - name: Install Rust
        uses: dtolnay/rust-toolchain@stable

      - name: Install gantry
        run: |
          if ! command -v gantry &> /dev/null; then
            cargo install gantry-cli
          fi

      - name: Deploy
        run: gantry deploy --commit ${{ github.sha }}
"#;

/// Generate the GitHub Actions workflow yaml content.
fn generate_workflow_yaml(config: &GantryConfig) -> String {
    WORKFLOW_TEMPLATE
        .replace("@BUCKET_ENV@", &config.deploy.bucket_name_env)
        .replace("@REGION@", &config.project.region)
        .replace("@CACHE_DIR@", &config.cache.dir.display().to_string())
        .replace("@CACHE_PREFIX@", &config.cache.prefix)
}
