use std::path::{Path, PathBuf};
use std::process::Command;

/// Directory the build context is assembled in.
pub const BUNDLE_DIR: &str = ".gantry-bundle";

/// Paths never copied into the build context, whatever `.gitignore` says.
/// The runtime stage copies the whole context into the image, so `.env`
/// must stay out.
const ALWAYS_EXCLUDED: &[&str] = &[BUNDLE_DIR, ".gantry", ".git", ".env"];

/// Assemble the docker build context in `.gantry-bundle/`.
///
/// Files come from `git ls-files` (tracked plus untracked-but-not-ignored),
/// and the generated Dockerfile is written next to them.
pub fn create_bundle(project_dir: &Path, dockerfile_content: &str) -> Result<PathBuf, BundleError> {
    let bundle_dir = project_dir.join(BUNDLE_DIR);

    if bundle_dir.exists() {
        std::fs::remove_dir_all(&bundle_dir).map_err(|e| BundleError::Cleanup {
            path: bundle_dir.clone(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(&bundle_dir).map_err(|e| BundleError::Create {
        path: bundle_dir.clone(),
        source: e,
    })?;

    let files = git_ls_files(project_dir)?;
    let mut copied = 0usize;

    for relative_path in &files {
        if is_excluded(relative_path) {
            continue;
        }

        let src = project_dir.join(relative_path);
        // Deleted-but-tracked files still show up in ls-files.
        if !src.is_file() {
            tracing::debug!(path = %relative_path.display(), "skipping missing file");
            continue;
        }
        let dst = bundle_dir.join(relative_path);

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BundleError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::copy(&src, &dst).map_err(|e| BundleError::CopyFile {
            path: src,
            source: e,
        })?;
        copied += 1;
    }

    let dockerfile_path = bundle_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| {
        BundleError::WriteDockerfile {
            path: dockerfile_path.clone(),
            source: e,
        }
    })?;

    tracing::debug!(files = copied, dir = %bundle_dir.display(), "build context assembled");
    Ok(bundle_dir)
}

fn is_excluded(relative_path: &Path) -> bool {
    relative_path
        .components()
        .next()
        .is_some_and(|first| ALWAYS_EXCLUDED.iter().any(|ex| first.as_os_str() == *ex))
}

/// Files git considers part of the project: tracked plus untracked files
/// that are not ignored.
fn git_ls_files(project_dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let stdout = git(project_dir, &["ls-files", "--cached", "--others", "--exclude-standard"])?;
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Local-only paths that never make the tree dirty.
const GENERATED: &[&str] = &[BUNDLE_DIR, ".env"];

/// Whether the git working tree has uncommitted changes, ignoring the
/// bundle directory and `.env`.
pub fn is_dirty(project_dir: &Path) -> Result<bool, BundleError> {
    let excludes: Vec<String> = GENERATED
        .iter()
        .map(|path| format!(":(exclude){path}"))
        .collect();
    let mut args = vec!["status", "--porcelain", "--", "."];
    args.extend(excludes.iter().map(String::as_str));

    let stdout = git(project_dir, &args)?;
    Ok(!stdout.trim().is_empty())
}

/// Full sha of `HEAD`.
pub fn head_commit(project_dir: &Path) -> Result<String, BundleError> {
    let stdout = git(project_dir, &["rev-parse", "HEAD"])?;
    let sha = stdout.trim();
    if sha.is_empty() {
        return Err(BundleError::GitFailed {
            detail: "git rev-parse HEAD printed nothing".to_owned(),
        });
    }
    Ok(sha.to_owned())
}

fn git(project_dir: &Path, args: &[&str]) -> Result<String, BundleError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(project_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: format!("failed to execute git {}", args.join(" ")),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to clean up bundle directory {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },
    #[error("git failed: {detail}")]
    GitFailed { detail: String },
}
