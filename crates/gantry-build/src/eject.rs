use std::path::{Path, PathBuf};

pub const EJECT_DIR: &str = ".gantry";
const DOCKERFILE: &str = "Dockerfile";
const DEPLOYMENT_TEMPLATE: &str = "deployment.json";

/// Write the generated Dockerfile and the deployment template into
/// `.gantry/` for hand editing.
///
/// Once ejected, `gantry build` and `gantry deploy` use these files instead
/// of generating them. Refuses to overwrite either file.
pub fn eject(
    project_dir: &Path,
    dockerfile_content: &str,
    deployment_template: &str,
) -> Result<Vec<PathBuf>, EjectError> {
    let eject_dir = project_dir.join(EJECT_DIR);
    let targets = [
        (eject_dir.join(DOCKERFILE), dockerfile_content),
        (eject_dir.join(DEPLOYMENT_TEMPLATE), deployment_template),
    ];

    if let Some((existing, _)) = targets.iter().find(|(path, _)| path.exists()) {
        return Err(EjectError::AlreadyEjected(existing.clone()));
    }

    std::fs::create_dir_all(&eject_dir).map_err(|e| EjectError::CreateDir {
        path: eject_dir.clone(),
        source: e,
    })?;

    let mut written = Vec::with_capacity(targets.len());
    for (path, content) in targets {
        std::fs::write(&path, content).map_err(|e| EjectError::Write {
            path: path.clone(),
            source: e,
        })?;
        written.push(path);
    }
    Ok(written)
}

/// Whether the project carries an ejected Dockerfile.
pub fn is_ejected(project_dir: &Path) -> bool {
    project_dir.join(EJECT_DIR).join(DOCKERFILE).exists()
}

pub fn load_ejected_dockerfile(project_dir: &Path) -> Result<String, EjectError> {
    let path = project_dir.join(EJECT_DIR).join(DOCKERFILE);
    std::fs::read_to_string(&path).map_err(|e| EjectError::Read { path, source: e })
}

/// The ejected deployment template, if there is one.
pub fn load_ejected_template(project_dir: &Path) -> Result<Option<String>, EjectError> {
    let path = project_dir.join(EJECT_DIR).join(DEPLOYMENT_TEMPLATE);
    if !path.exists() {
        return Ok(None);
    }
    std::fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| EjectError::Read { path, source: e })
}

#[derive(Debug, thiserror::Error)]
pub enum EjectError {
    #[error("failed to create .gantry directory at {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("build config already ejected at {0}; edit it directly or delete it to re-eject")]
    AlreadyEjected(PathBuf),
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read ejected file at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
