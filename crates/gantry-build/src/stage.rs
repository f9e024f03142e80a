//! Two-stage image plan and the invariants it must satisfy.
//!
//! A plan is a builder stage that produces wheels and a runtime stage that
//! installs exactly those wheels. [`ImagePlan::validate`] enforces the
//! properties the runtime image depends on:
//!
//! - the runtime stage switches to a non-root user before `ENTRYPOINT`/`CMD`
//! - nothing is installed or copied after that switch
//! - the only thing copied out of the builder is the artifact directory
//! - the runtime wheel install names exactly the builder's artifacts
//! - no builder toolchain package is installed in the runtime stage

use std::collections::BTreeSet;

use gantry_core::model::is_privileged;
use gantry_core::{ArtifactRef, BuildStage};

use crate::instruction::{Instruction, expand_args};

/// Where the builder stage leaves its wheels.
pub const ARTIFACT_DIR: &str = "/wheels";

/// Offline install from the artifact directory; the package list follows.
pub const WHEEL_INSTALL: &str = "pip install --no-index --find-links /wheels";

#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: BuildStage,
    pub instructions: Vec<Instruction>,
}

impl StagePlan {
    /// `ARG` defaults declared in this stage, in declaration order.
    pub fn arg_defaults(&self) -> Vec<(String, String)> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Arg {
                    name,
                    default: Some(value),
                } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&format!(
            "FROM {} AS {}\n",
            self.stage.base_environment, self.stage.name
        ));
        for instruction in &self.instructions {
            out.push_str(&instruction.to_string());
            out.push('\n');
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub builder: StagePlan,
    pub runtime: StagePlan,
}

impl ImagePlan {
    /// Check the plan's invariants, returning the user the server runs as.
    pub fn validate(&self) -> Result<String, PlanError> {
        self.check_stage_boundary()?;
        self.check_identity_switch()
    }

    fn check_stage_boundary(&self) -> Result<(), PlanError> {
        let builder = &self.builder.stage;
        let runtime = &self.runtime.stage;

        if let Some(pkg) = builder
            .installed_packages
            .intersection(&runtime.installed_packages)
            .next()
        {
            return Err(PlanError::ToolchainLeak {
                package: pkg.clone(),
            });
        }

        for instruction in &self.runtime.instructions {
            if let Instruction::Copy {
                from: Some(stage),
                src,
                ..
            } = instruction
                && (stage != &builder.name || src != ARTIFACT_DIR)
            {
                return Err(PlanError::UndeclaredStageCopy {
                    stage: stage.clone(),
                    src: src.clone(),
                });
            }
        }

        check_same_artifacts(&builder.produced_artifacts, &runtime.produced_artifacts)?;
        check_same_artifacts(&runtime.produced_artifacts, &self.runtime.installed_wheels())
    }

    fn check_identity_switch(&self) -> Result<String, PlanError> {
        let args = self.runtime.arg_defaults();
        let mut current_user: Option<String> = None;
        let mut saw_command = false;

        for instruction in &self.runtime.instructions {
            match instruction {
                Instruction::User(raw) => {
                    let user = expand_args(raw, &args);
                    if is_privileged(&user) {
                        return Err(PlanError::RunsAsRoot { user });
                    }
                    current_user = Some(user);
                }
                i if i.mutates_filesystem() && current_user.is_some() => {
                    return Err(PlanError::InstallAfterIdentitySwitch {
                        instruction: i.to_string(),
                    });
                }
                Instruction::Entrypoint(_) | Instruction::Cmd(_) => {
                    if current_user.is_none() {
                        return Err(PlanError::CommandBeforeIdentitySwitch {
                            instruction: instruction.to_string(),
                        });
                    }
                    saw_command = true;
                }
                _ => {}
            }
        }

        match current_user {
            Some(user) if saw_command => Ok(user),
            Some(_) => Err(PlanError::MissingCommand),
            None => Err(PlanError::MissingIdentitySwitch),
        }
    }

    /// Render the full Dockerfile.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.builder.render_into(&mut out);
        out.push('\n');
        self.runtime.render_into(&mut out);
        out
    }
}

fn check_same_artifacts(
    expected: &BTreeSet<ArtifactRef>,
    actual: &BTreeSet<ArtifactRef>,
) -> Result<(), PlanError> {
    if expected == actual {
        return Ok(());
    }
    let artifacts = expected
        .symmetric_difference(actual)
        .map(ToString::to_string)
        .collect();
    Err(PlanError::ArtifactMismatch { artifacts })
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] gantry_core::Error),

    #[error("runtime stage installs builder-only package '{package}'")]
    ToolchainLeak { package: String },

    #[error("runtime stage copies {src} from stage '{stage}'; only {ARTIFACT_DIR} may cross the stage boundary")]
    UndeclaredStageCopy { stage: String, src: String },

    #[error("runtime install set differs from builder artifacts: {}", artifacts.join(", "))]
    ArtifactMismatch { artifacts: Vec<String> },

    #[error("runtime stage switches to privileged user '{user}'")]
    RunsAsRoot { user: String },

    #[error("`{instruction}` runs after the identity switch; installs must happen before USER")]
    InstallAfterIdentitySwitch { instruction: String },

    #[error("`{instruction}` is declared before the identity switch")]
    CommandBeforeIdentitySwitch { instruction: String },

    #[error("runtime stage never switches away from root")]
    MissingIdentitySwitch,

    #[error("runtime stage has no ENTRYPOINT or CMD")]
    MissingCommand,
}
