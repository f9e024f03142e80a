//! Dependency manifest (`requirements.txt`) loading.
//!
//! Only fully pinned manifests are accepted. Every wheel the builder stage
//! produces is named by `name==version`, and the runtime stage installs
//! exactly that set, so an unpinned entry would let the two stages disagree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::ArtifactRef;

/// A parsed, fully pinned dependency manifest.
#[derive(Debug, Clone)]
pub struct DependencyManifest {
    /// Path the manifest was read from
    pub path: PathBuf,
    /// Pinned entries, sorted and deduplicated by normalised name
    pub entries: Vec<ArtifactRef>,
}

impl DependencyManifest {
    /// Read and parse the manifest at `project_dir/relative`.
    ///
    /// # Errors
    ///
    /// - [`Error::ManifestMissing`](crate::Error::ManifestMissing) if the file cannot be read
    /// - [`Error::UnpinnedRequirement`](crate::Error::UnpinnedRequirement) for any entry that is not `name==version`
    /// - [`Error::ConflictingPins`](crate::Error::ConflictingPins) if a name is pinned to two versions
    pub fn load(project_dir: &Path, relative: &Path) -> crate::Result<Self> {
        let path = project_dir.join(relative);
        tracing::debug!(path = %path.display(), "reading dependency manifest");
        let content =
            std::fs::read_to_string(&path).map_err(|e| crate::Error::ManifestMissing {
                path: path.clone(),
                source: e,
            })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: PathBuf, content: &str) -> crate::Result<Self> {
        let mut pins: BTreeMap<String, (usize, ArtifactRef)> = BTreeMap::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let Some(entry) = parse_line(raw) else {
                continue;
            };
            let artifact = entry.map_err(|entry| crate::Error::UnpinnedRequirement {
                path: path.clone(),
                line: line_no,
                entry,
            })?;

            if let Some((_, existing)) = pins.get(&artifact.name) {
                if existing.version != artifact.version {
                    return Err(crate::Error::ConflictingPins {
                        path,
                        line: line_no,
                        name: artifact.name,
                        first: existing.version.clone(),
                        second: artifact.version,
                    });
                }
                continue;
            }
            pins.insert(artifact.name.clone(), (line_no, artifact));
        }

        let entries: Vec<ArtifactRef> = pins.into_values().map(|(_, a)| a).collect();
        tracing::debug!(entries = entries.len(), "dependency manifest parsed");
        Ok(Self { path, entries })
    }
}

/// `None` for lines that carry no requirement, `Err(entry)` for an entry
/// that is not pinned to an exact version.
fn parse_line(raw: &str) -> Option<Result<ArtifactRef, String>> {
    let line = raw.split(" #").next().unwrap_or(raw).trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    let requirement = line.split(';').next().unwrap_or(line).trim();
    // Hash-checking mode appends `--hash=...` options to the requirement.
    let requirement = requirement
        .split_whitespace()
        .next()
        .unwrap_or(requirement);

    let Some((name, version)) = requirement.split_once("==") else {
        return Some(Err(requirement.to_owned()));
    };
    let name = name.split('[').next().unwrap_or(name).trim();
    let version = version.trim();
    let pinned = !name.is_empty()
        && !version.is_empty()
        && !version.starts_with('=')
        && !version.contains(['*', ',', '<', '>', '!', '~']);
    if !pinned {
        return Some(Err(requirement.to_owned()));
    }
    Some(Ok(ArtifactRef::new(name, version)))
}
