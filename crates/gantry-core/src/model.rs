//! Pipeline-run scoped domain types.
//!
//! Nothing here is persisted. A run builds two [`BuildStage`]s, tags one
//! image twice ([`ImageTags`]) and hands a desired state to the control plane,
//! which reports back a [`DeploymentState`] when asked.

use std::collections::BTreeSet;
use std::fmt;

/// A precompiled installable unit (a wheel), identified by name and version.
///
/// # Examples
///
/// ```
/// use gantry_core::ArtifactRef;
///
/// let a = ArtifactRef::new("Flask_Marshmallow", "0.11.0");
/// assert_eq!(a.to_string(), "flask-marshmallow==0.11.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactRef {
    pub name: String,
    pub version: String,
}

impl ArtifactRef {
    /// Create a reference, normalising the name the way pip compares them.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: normalize_name(name),
            version: version.to_owned(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Lowercase and collapse runs of `-`, `_` and `.` into a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// One stage of the multi-stage image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStage {
    pub name: String,
    pub base_environment: String,
    /// OS packages installed by this stage
    pub installed_packages: BTreeSet<String>,
    /// Artifacts this stage leaves behind for later stages
    pub produced_artifacts: BTreeSet<ArtifactRef>,
}

/// The unprivileged principal the server process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeIdentity {
    pub user_name: String,
    pub home_directory: String,
}

impl RuntimeIdentity {
    /// # Errors
    ///
    /// [`Error::PrivilegedIdentity`](crate::Error::PrivilegedIdentity) for `root`
    /// or uid `0`, [`Error::InvalidConfig`](crate::Error::InvalidConfig) for an
    /// empty name or a name `useradd` would reject.
    pub fn new(user_name: &str, home_directory: &str) -> crate::Result<Self> {
        let user_name = user_name.trim();
        if is_privileged(user_name) {
            return Err(crate::Error::PrivilegedIdentity(user_name.to_owned()));
        }
        let valid = user_name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && user_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'));
        if !valid {
            return Err(crate::Error::InvalidConfig {
                field: "build.execution_user_name",
                reason: format!("{user_name:?} is not a valid user name"),
            });
        }
        Ok(Self {
            user_name: user_name.to_owned(),
            home_directory: home_directory.to_owned(),
        })
    }
}

/// `root`, or any spelling of uid 0.
pub fn is_privileged(user: &str) -> bool {
    let user = user.split(':').next().unwrap_or(user).trim();
    user == "root" || (!user.is_empty() && user.chars().all(|c| c == '0'))
}

/// `registry/repository:tag`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// The two tags every run publishes for the same image content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTags {
    pub commit: ImageTag,
    pub latest: ImageTag,
}

impl ImageTags {
    pub const LATEST: &'static str = "latest";

    pub fn new(registry: &str, repository: &str, commit_sha: &str) -> Self {
        let tag = |t: &str| ImageTag {
            registry: registry.to_owned(),
            repository: repository.to_owned(),
            tag: t.to_owned(),
        };
        Self {
            commit: tag(commit_sha),
            latest: tag(Self::LATEST),
        }
    }

    /// `registry/repository`, without a tag.
    pub fn repository_location(&self) -> String {
        format!("{}/{}", self.commit.registry, self.commit.repository)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageTag> {
        [&self.commit, &self.latest].into_iter()
    }
}

/// Readiness contract the control plane applies to a new deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub path: String,
    pub success_codes: BTreeSet<u16>,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

/// Lightsail rejects thresholds below this.
pub const MIN_THRESHOLD: u32 = 2;

impl HealthCheckPolicy {
    pub fn validate(&self) -> crate::Result<()> {
        let bad = |reason: String| crate::Error::InvalidDescriptor(reason);
        if !self.path.starts_with('/') {
            return Err(bad(format!(
                "health check path {:?} must start with '/'",
                self.path
            )));
        }
        if self.success_codes.is_empty() {
            return Err(bad("health check needs at least one success code".to_owned()));
        }
        if let Some(code) = self
            .success_codes
            .iter()
            .find(|c| !(200..=499).contains(*c))
        {
            return Err(bad(format!("success code {code} is outside 200-499")));
        }
        if self.healthy_threshold < MIN_THRESHOLD || self.unhealthy_threshold < MIN_THRESHOLD {
            return Err(bad(format!(
                "health thresholds must be at least {MIN_THRESHOLD}"
            )));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds >= self.interval_seconds {
            return Err(bad(
                "health check timeout must be non-zero and shorter than the interval".to_owned(),
            ));
        }
        Ok(())
    }

    /// Success codes as the control plane expects them: `200,204-206`.
    pub fn success_codes_spec(&self) -> String {
        format_code_ranges(&self.success_codes)
    }
}

/// Join codes with commas, collapsing contiguous runs into `a-b`.
pub fn format_code_ranges(codes: &BTreeSet<u16>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = codes.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1).filter(|n| iter.peek() == Some(n)) {
            end = next;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(",")
}

/// Parse `200,204-206` back into a set.
pub fn parse_code_ranges(spec: &str) -> Result<BTreeSet<u16>, String> {
    let code = |s: &str| -> Result<u16, String> {
        s.trim()
            .parse()
            .map_err(|e| format!("{s:?} is not a status code: {e}"))
    };
    let mut codes = BTreeSet::new();
    for part in spec.split(',').map(str::trim) {
        match part.split_once('-') {
            Some((a, b)) => {
                let (a, b) = (code(a)?, code(b)?);
                if a > b {
                    return Err(format!("range {part:?} is reversed"));
                }
                codes.extend(a..=b);
            }
            None => {
                codes.insert(code(part)?);
            }
        }
    }
    Ok(codes)
}

/// Deployment state as owned by the control plane.
///
/// The pipeline only ever produces `Submitted`; the other states are
/// observed later through `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Submitted,
    Healthy,
    UnhealthyRollback,
}

/// Which deployment of a container service a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentSlot {
    Current,
    Next,
}

impl DeploymentState {
    /// Map a Lightsail container-service deployment state.
    ///
    /// `INACTIVE` only means a rollback for the next deployment; a current
    /// deployment goes inactive when it is replaced.
    pub fn from_lightsail(state: &str, slot: DeploymentSlot) -> Option<Self> {
        match (state.to_ascii_uppercase().as_str(), slot) {
            ("PENDING" | "ACTIVATING", _) => Some(Self::Submitted),
            ("ACTIVE", _) => Some(Self::Healthy),
            ("FAILED", _) | ("INACTIVE", DeploymentSlot::Next) => Some(Self::UnhealthyRollback),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Submitted => "SUBMITTED",
            Self::Healthy => "HEALTHY",
            Self::UnhealthyRollback => "UNHEALTHY_ROLLBACK",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_name("Flask__Marshmallow"), "flask-marshmallow");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("A-._b"), "a-b");
    }

    #[test]
    fn root_is_privileged() {
        assert!(is_privileged("root"));
        assert!(is_privileged("0"));
        assert!(is_privileged("000"));
        assert!(is_privileged("root:root"));
        assert!(!is_privileged("giftless"));
        assert!(!is_privileged(""));
    }

    #[test]
    fn runtime_identity_rejects_root() {
        let err = RuntimeIdentity::new("root", "/app").unwrap_err();
        assert!(matches!(err, crate::Error::PrivilegedIdentity(_)));
    }

    #[test]
    fn runtime_identity_rejects_garbage() {
        assert!(RuntimeIdentity::new("Bad User", "/app").is_err());
        assert!(RuntimeIdentity::new("", "/app").is_err());
        assert!(RuntimeIdentity::new("9lives", "/app").is_err());
    }

    #[test]
    fn image_tags_share_repository() {
        let tags = ImageTags::new("reg.example", "giftless", "abc123");
        assert_eq!(tags.commit.to_string(), "reg.example/giftless:abc123");
        assert_eq!(tags.latest.to_string(), "reg.example/giftless:latest");
        assert_eq!(tags.repository_location(), "reg.example/giftless");
        assert_eq!(tags.iter().count(), 2);
    }

    #[test]
    fn code_ranges_collapse_runs() {
        let codes = BTreeSet::from([200, 204, 205, 206, 301]);
        assert_eq!(format_code_ranges(&codes), "200,204-206,301");
    }

    #[test]
    fn parse_code_ranges_rejects_reversed() {
        assert!(parse_code_ranges("300-200").is_err());
        assert!(parse_code_ranges("abc").is_err());
    }

    #[test]
    fn lightsail_states_map() {
        use DeploymentSlot::{Current, Next};

        assert_eq!(
            DeploymentState::from_lightsail("ACTIVATING", Next),
            Some(DeploymentState::Submitted)
        );
        assert_eq!(
            DeploymentState::from_lightsail("active", Current),
            Some(DeploymentState::Healthy)
        );
        assert_eq!(
            DeploymentState::from_lightsail("FAILED", Current),
            Some(DeploymentState::UnhealthyRollback)
        );
        assert_eq!(DeploymentState::from_lightsail("UNKNOWN", Next), None);
    }

    #[test]
    fn inactive_is_a_rollback_only_for_the_next_deployment() {
        assert_eq!(
            DeploymentState::from_lightsail("INACTIVE", DeploymentSlot::Next),
            Some(DeploymentState::UnhealthyRollback)
        );
        assert_eq!(
            DeploymentState::from_lightsail("INACTIVE", DeploymentSlot::Current),
            None
        );
    }

    #[test]
    fn code_ranges_reach_the_top_of_u16() {
        let codes = BTreeSet::from([65533, 65534, u16::MAX]);
        assert_eq!(format_code_ranges(&codes), "65533-65535");
        assert_eq!(format_code_ranges(&BTreeSet::from([u16::MAX])), "65535");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn code_ranges_roundtrip(codes in proptest::collection::btree_set(200u16..500, 1..20)) {
                let spec = format_code_ranges(&codes);
                prop_assert_eq!(parse_code_ranges(&spec), Ok(codes));
            }

            #[test]
            fn normalize_is_idempotent(name in "[A-Za-z0-9._-]{1,30}") {
                let once = normalize_name(&name);
                prop_assert_eq!(normalize_name(&once), once.clone());
            }
        }
    }
}
