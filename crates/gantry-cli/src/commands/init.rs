use std::path::Path;

const GANTRY_TOML: &str = r#"[project]
# name = "giftless"
# region = "us-east-1"

[build]
# server_version = "2.0.18"
# execution_user_name = "giftless"
# extra_middleware_packages = ["wsgi_cors_middleware"]
# manifest = "requirements.txt"

[server]
# http = "0.0.0.0:80"
# processes = 2
# threads = 2

[cache]
# dir = "/tmp/.buildx-cache"
# prefix = "buildx"

[registry]
# url = "123456789012.dkr.ecr.us-east-1.amazonaws.com"
# repository = "giftless"

[deploy]
# container_port = 8080
# health_check_path = "/health"
# success_codes = [200]
# bucket_name_env = "BUCKET_NAME"
"#;

const ENV_EXAMPLE: &str = "BUCKET_NAME=your-lfs-bucket
AWS_ACCESS_KEY_ID=your-access-key-id
AWS_SECRET_ACCESS_KEY=your-secret-access-key
";

/// Entries `init` makes sure `.gitignore` carries.
const GITIGNORE_ENTRIES: &[&str] = &[".env", ".gantry-bundle/"];

/// Append the missing [`GITIGNORE_ENTRIES`] to `.gitignore`, creating it if
/// needed. Returns whether the file changed.
fn ensure_gitignore(project_dir: &Path) -> std::io::Result<bool> {
    let path = project_dir.join(".gitignore");
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in missing {
        content.push_str(entry);
        content.push('\n');
    }
    std::fs::write(&path, content)?;
    Ok(true)
}

/// Initialize gantry in an existing giftless project.
pub async fn init_project() -> anyhow::Result<()> {
    if !Path::new("requirements.txt").exists() {
        anyhow::bail!("requirements.txt not found. Run this command from the giftless project root.");
    }

    let mut created = Vec::new();

    for (path, content) in [("gantry.toml", GANTRY_TOML), (".env.example", ENV_EXAMPLE)] {
        if Path::new(path).exists() {
            eprintln!("{path} already exists, skipping");
        } else {
            std::fs::write(path, content)?;
            created.push(path);
        }
    }

    let gitignore_updated = ensure_gitignore(Path::new("."))?;

    if created.is_empty() && !gitignore_updated {
        println!("Nothing to create; already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
        if gitignore_updated {
            println!("Added .env and .gantry-bundle/ to .gitignore");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Configure deploy secrets (keep .env out of git):");
    println!("     cp .env.example .env");
    println!();
    println!("  2. Check your tools and credentials:");
    println!("     gantry doctor");
    println!();
    println!("  3. Deploy:");
    println!("     gantry deploy");

    Ok(())
}
