use std::collections::BTreeSet;

use gantry_core::{ArtifactRef, BuildStage, DependencyManifest, GantryConfig};

use crate::instruction::Instruction;
use crate::stage::{ARTIFACT_DIR, ImagePlan, PlanError, StagePlan, WHEEL_INSTALL};

/// Package name of the process supervisor pinned by `SERVER_VERSION`.
pub const SERVER_PACKAGE: &str = "uwsgi";

pub const ARG_SERVER_VERSION: &str = "SERVER_VERSION";
pub const ARG_USER_NAME: &str = "USER_NAME";
pub const ARG_EXTRA_PACKAGES: &str = "EXTRA_PACKAGES";

const BUILDER_STAGE: &str = "builder";
const RUNTIME_STAGE: &str = "runtime";

/// Generates the two-stage Dockerfile: wheels in a disposable builder,
/// a slim runtime that installs only those wheels.
pub struct DockerfileGenerator<'a> {
    config: &'a GantryConfig,
    manifest: &'a DependencyManifest,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(config: &'a GantryConfig, manifest: &'a DependencyManifest) -> Self {
        Self { config, manifest }
    }

    /// Artifacts the builder stage produces: the pinned server plus every
    /// manifest entry.
    pub fn artifacts(&self) -> BTreeSet<ArtifactRef> {
        let mut artifacts: BTreeSet<ArtifactRef> = self.manifest.entries.iter().cloned().collect();
        artifacts.retain(|a| a.name != SERVER_PACKAGE);
        artifacts.insert(ArtifactRef::new(
            SERVER_PACKAGE,
            &self.config.build.server_version,
        ));
        artifacts
    }

    pub fn plan(&self) -> Result<ImagePlan, PlanError> {
        let artifacts = self.artifacts();
        Ok(ImagePlan {
            builder: self.builder_stage(&artifacts),
            runtime: self.runtime_stage(&artifacts)?,
        })
    }

    /// Plan, validate and render.
    pub fn render(&self) -> Result<String, PlanError> {
        let plan = self.plan()?;
        let user = plan.validate()?;
        tracing::debug!(
            user = %user,
            artifacts = plan.builder.stage.produced_artifacts.len(),
            "image plan validated"
        );
        Ok(format!(
            "# Generated by gantry; edit gantry.toml or run `gantry eject`.\n\n{}",
            plan.render()
        ))
    }

    fn builder_stage(&self, artifacts: &BTreeSet<ArtifactRef>) -> StagePlan {
        let build = &self.config.build;
        let manifest = manifest_in_context(self.config);

        let mut instructions = vec![
            Instruction::Comment("=== Stage 1: Builder (wheels only, never shipped) ===".to_owned()),
            Instruction::arg(ARG_SERVER_VERSION, build.server_version.as_str()),
        ];
        if !build.build_packages.is_empty() {
            instructions.push(Instruction::run(apt_install(&build.build_packages)));
        }
        instructions.extend([
            Instruction::Workdir("/build".to_owned()),
            Instruction::copy(manifest, "requirements.txt"),
            Instruction::run(format!(
                "pip wheel --wheel-dir {ARTIFACT_DIR} \"{SERVER_PACKAGE}==${{{ARG_SERVER_VERSION}}}\""
            )),
            Instruction::run(format!(
                "pip wheel --wheel-dir {ARTIFACT_DIR} -r requirements.txt"
            )),
        ]);

        StagePlan {
            stage: BuildStage {
                name: BUILDER_STAGE.to_owned(),
                base_environment: build.builder_image.clone(),
                installed_packages: build.build_packages.iter().cloned().collect(),
                produced_artifacts: artifacts.clone(),
            },
            instructions,
        }
    }

    fn runtime_stage(&self, artifacts: &BTreeSet<ArtifactRef>) -> Result<StagePlan, PlanError> {
        let build = &self.config.build;
        let identity = self.config.runtime_identity()?;

        let stage = BuildStage {
            name: RUNTIME_STAGE.to_owned(),
            base_environment: build.runtime_image.clone(),
            installed_packages: build.runtime_libraries.iter().cloned().collect(),
            produced_artifacts: artifacts.clone(),
        };
        let allow_list: Vec<String> = stage
            .produced_artifacts
            .iter()
            .map(|a| {
                if a.name == SERVER_PACKAGE {
                    format!("\"{SERVER_PACKAGE}==${{{ARG_SERVER_VERSION}}}\"")
                } else {
                    a.to_string()
                }
            })
            .collect();

        let mut instructions = vec![
            Instruction::Comment("=== Stage 2: Runtime ===".to_owned()),
            Instruction::arg(ARG_SERVER_VERSION, build.server_version.as_str()),
        ];
        if !build.runtime_libraries.is_empty() {
            instructions.push(Instruction::run(apt_install(&build.runtime_libraries)));
        }
        instructions.extend([
            Instruction::copy_from(BUILDER_STAGE, ARTIFACT_DIR, ARTIFACT_DIR),
            Instruction::run(format!("{WHEEL_INSTALL} {}", allow_list.join(" "))),
            Instruction::copy(".", build.app_root.as_str()),
            Instruction::run(format!("pip install -e {}", build.app_root)),
            Instruction::arg(
                ARG_EXTRA_PACKAGES,
                build.extra_middleware_packages.join(" "),
            ),
            Instruction::run(format!(
                "if [ -n \"${{{ARG_EXTRA_PACKAGES}}}\" ]; then pip install ${{{ARG_EXTRA_PACKAGES}}}; fi"
            )),
            Instruction::arg(ARG_USER_NAME, identity.user_name.as_str()),
            Instruction::run(format!(
                "useradd -d {} ${{{ARG_USER_NAME}}}",
                identity.home_directory
            )),
            Instruction::User(format!("${{{ARG_USER_NAME}}}")),
            Instruction::Workdir(build.app_root.clone()),
            Instruction::env(&build.entrypoint_module_var, &build.entrypoint_module),
        ]);

        let mut env: Vec<(&String, &String)> = build.env.iter().collect();
        env.sort();
        for (key, value) in env {
            instructions.push(Instruction::env(key, value));
        }

        if let Some(port) = self.config.server_port() {
            instructions.push(Instruction::Expose(port));
        }

        instructions.push(Instruction::Entrypoint(
            ["tini", SERVER_PACKAGE, "--"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        ));
        instructions.push(Instruction::Cmd(server_args(self.config)));

        Ok(StagePlan {
            stage,
            instructions,
        })
    }
}

/// Values for `docker buildx build --build-arg`. Ejected Dockerfiles get
/// the same set.
pub fn build_args(config: &GantryConfig) -> Vec<(String, String)> {
    let build = &config.build;
    vec![
        (ARG_SERVER_VERSION.to_owned(), build.server_version.clone()),
        (ARG_USER_NAME.to_owned(), build.execution_user_name.clone()),
        (
            ARG_EXTRA_PACKAGES.to_owned(),
            build.extra_middleware_packages.join(" "),
        ),
    ]
}

/// Default arguments for the process supervisor.
pub fn server_args(config: &GantryConfig) -> Vec<String> {
    let server = &config.server;
    let mut args = vec![
        "--http".to_owned(),
        server.http.clone(),
        "-M".to_owned(),
        "-T".to_owned(),
        "--threads".to_owned(),
        server.threads.to_string(),
        "-p".to_owned(),
        server.processes.to_string(),
    ];
    if server.manage_script_name {
        args.push("--manage-script-name".to_owned());
    }
    args.push("--callable".to_owned());
    args.push(server.callable.clone());
    args
}

fn apt_install(packages: &[String]) -> String {
    format!(
        "apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
        packages.join(" ")
    )
}

/// Manifest path as seen from the build context, with `/` separators.
fn manifest_in_context(config: &GantryConfig) -> String {
    config
        .build
        .manifest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
