use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SECRET_VARS: [&str; 3] = ["BUCKET_NAME", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

fn gantry() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("gantry");
    for name in SECRET_VARS {
        cmd.env_remove(name);
    }
    cmd.env_remove("GITHUB_SHA");
    cmd
}

/// Minimal giftless project: a pinned requirements.txt and a WSGI module.
fn giftless_project(dir: &Path) {
    std::fs::write(
        dir.join("requirements.txt"),
        "boto3==1.14.0\nflask==1.1.2\nflask-marshmallow==0.11.0\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.join("giftless")).unwrap();
    std::fs::write(dir.join("giftless/wsgi_entrypoint.py"), "app = None\n").unwrap();
}

fn git(dir: &Path, args: &[&str]) {
    std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
}

fn commit_all(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["config", "user.email", "t@t.com"]);
    git(dir, &["config", "user.name", "T"]);
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "init"]);
}

// ── Help / Version ──

#[test]
fn shows_help() {
    gantry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("giftless"))
        .stdout(predicate::str::contains("Lightsail"));
}

#[test]
fn shows_version() {
    gantry()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gantry"));
}

// ── Init Command ──

#[test]
fn init_writes_config_and_env_example() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created gantry.toml"));

    let env = std::fs::read_to_string(tmp.path().join(".env.example")).unwrap();
    for name in SECRET_VARS {
        assert!(env.contains(name), "{name} missing from .env.example");
    }
    let gitignore = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".env"));
    assert!(gitignore.lines().any(|l| l == ".gantry-bundle/"));

    gantry()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn init_requires_requirements_txt() {
    let tmp = TempDir::new().unwrap();

    gantry()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("requirements.txt not found"));
}

// ── Render Command ──

#[test]
fn render_dockerfile_switches_user_before_cmd() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    let out = gantry()
        .current_dir(tmp.path())
        .args(["render", "dockerfile"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let dockerfile = String::from_utf8(out).unwrap();

    let user = dockerfile.find("USER ${USER_NAME}").expect("no USER");
    let cmd = dockerfile.find("CMD ").expect("no CMD");
    assert!(user < cmd);
    assert!(dockerfile.contains("uwsgi==${SERVER_VERSION}"));
    assert_eq!(dockerfile.matches("FROM ").count(), 2);
}

#[test]
fn render_dockerfile_rejects_root_override() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .args(["render", "dockerfile", "--user", "root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root"));
}

#[test]
fn render_dockerfile_fails_on_unpinned_requirement() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("requirements.txt"), "flask>=1.0\n").unwrap();

    gantry()
        .current_dir(tmp.path())
        .args(["render", "dockerfile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not pinned"));
}

#[test]
fn render_descriptor_masks_environment() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .args(["render", "descriptor", "--commit", "abc1234"])
        .env("AWS_SECRET_ACCESS_KEY", "super-secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"serviceName\": \"giftless\""))
        .stdout(predicate::str::contains("giftless:abc1234"))
        .stdout(predicate::str::contains("\"path\": \"/health\""))
        .stdout(predicate::str::contains("***"))
        .stdout(predicate::str::contains("super-secret").not());
}

// ── Eject Command ──

#[test]
fn eject_writes_dockerfile_and_template() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ejected"));

    let dockerfile = std::fs::read_to_string(tmp.path().join(".gantry/Dockerfile")).unwrap();
    assert!(dockerfile.contains("USER ${USER_NAME}"));
    let template = std::fs::read_to_string(tmp.path().join(".gantry/deployment.json")).unwrap();
    assert!(template.contains("${commit_sha}"));
}

#[test]
fn eject_fails_on_second_run() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .success();

    gantry()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already ejected"));
}

#[test]
fn render_dockerfile_prefers_ejected_copy() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join(".gantry")).unwrap();
    std::fs::write(
        tmp.path().join(".gantry/Dockerfile"),
        "FROM scratch\n# hand edited\n",
    )
    .unwrap();

    gantry()
        .current_dir(tmp.path())
        .args(["render", "dockerfile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# hand edited"));
}

// ── Deploy Command ──

#[test]
fn deploy_fails_on_non_git_directory() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("git"));
}

#[test]
fn deploy_dirty_repo_blocked_without_flag() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    giftless_project(dir);
    commit_all(dir);

    std::fs::write(dir.join("giftless/wsgi_entrypoint.py"), "app = 1\n").unwrap();

    gantry()
        .current_dir(dir)
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("uncommitted changes"));
}

#[test]
fn deploy_fails_fast_without_secrets() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    giftless_project(dir);
    commit_all(dir);

    gantry()
        .current_dir(dir)
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("BUCKET_NAME is not set"));
}

#[test]
fn build_refuses_invalid_config() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());
    std::fs::write(
        tmp.path().join("gantry.toml"),
        "[build]\nexecution_user_name = \"root\"\n",
    )
    .unwrap();

    gantry()
        .current_dir(tmp.path())
        .args(["build", "--allow-dirty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root"));
}

// ── Cache Command ──

#[test]
fn cache_list_on_empty_store() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("gantry.toml"), "[cache]\ndir = \"layers\"\n").unwrap();

    gantry()
        .current_dir(tmp.path())
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache entries"));
}

#[test]
fn cache_list_and_clear() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("gantry.toml"), "[cache]\ndir = \"layers\"\n").unwrap();
    std::fs::create_dir_all(tmp.path().join("layers/Linux-buildx-42")).unwrap();
    std::fs::create_dir_all(tmp.path().join("layers/Linux-buildx-43.new")).unwrap();

    gantry()
        .current_dir(tmp.path())
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Linux-buildx-42"))
        .stdout(predicate::str::contains("Linux-buildx-43").not());

    gantry()
        .current_dir(tmp.path())
        .args(["cache", "clear"])
        .assert()
        .success();
    assert!(!tmp.path().join("layers").exists());
}

// ── CI Command ──

#[test]
fn ci_init_writes_workflow_once() {
    let tmp = TempDir::new().unwrap();
    giftless_project(tmp.path());

    gantry()
        .current_dir(tmp.path())
        .args(["ci", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created .github/workflows/gantry-deploy.yml"));

    let workflow =
        std::fs::read_to_string(tmp.path().join(".github/workflows/gantry-deploy.yml")).unwrap();
    assert!(workflow.contains("gantry deploy --commit ${{ github.sha }}"));
    assert!(workflow.contains("restore-keys"));

    gantry()
        .current_dir(tmp.path())
        .args(["ci", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
