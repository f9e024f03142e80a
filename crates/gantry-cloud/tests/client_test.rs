use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use gantry_cloud::aws::{AwsClient, DeployError, ecr_registry};
use gantry_cloud::command::CommandError;
use gantry_cloud::docker::{BuildRequest, DockerClient, ImageBuildError, PublishError};
use gantry_cloud::doctor::check_tools;
use gantry_cloud::executor::CommandExecutor;
use gantry_core::{DeploymentDescriptor, DeploymentState, HealthCheckPolicy, ImageTags, Protocol};
use mockall::mock;
use secrecy::SecretString;

mock! {
    Executor {}

    impl CommandExecutor for Executor {
        async fn exec(&self, program: &str, args: &[String]) -> Result<String, CommandError>;
        async fn exec_streaming(&self, program: &str, args: &[String]) -> Result<(), CommandError>;
        async fn exec_with_stdin(
            &self,
            program: &str,
            args: &[String],
            stdin_data: &[u8],
        ) -> Result<String, CommandError>;
    }
}

const DIGEST_A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const DIGEST_B: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn tags() -> ImageTags {
    ImageTags::new("123.dkr.ecr.us-east-1.amazonaws.com", "giftless", "abc123")
}

fn failed(program: &str) -> CommandError {
    CommandError::CommandFailed {
        program: program.to_owned(),
        args: vec![],
        stderr: "boom".to_owned(),
    }
}

fn push_output(tag: &str, digest: &str) -> String {
    format!("The push refers to repository [x]\n{tag}: digest: {digest} size: 2201\n")
}

fn is_push_of(args: &[String], tag: &str) -> bool {
    args.first().map(String::as_str) == Some("push") && args.iter().any(|a| a.ends_with(tag))
}

fn descriptor() -> DeploymentDescriptor {
    DeploymentDescriptor {
        service_name: "giftless".to_owned(),
        container_name: "giftless".to_owned(),
        image_ref: "123.dkr.ecr.us-east-1.amazonaws.com/giftless:abc123".to_owned(),
        environment: BTreeMap::from([
            ("AWS_SECRET_ACCESS_KEY".to_owned(), "very-secret".to_owned()),
            ("BUCKET_NAME".to_owned(), "lfs-bucket".to_owned()),
        ]),
        port_mappings: BTreeMap::from([(8080, Protocol::Http)]),
        container_port: 8080,
        health_check: HealthCheckPolicy {
            path: "/health".to_owned(),
            success_codes: BTreeSet::from([200]),
            interval_seconds: 5,
            timeout_seconds: 2,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        },
    }
}

// ── Docker: build ──

#[tokio::test]
async fn build_streams_buildx() {
    let mut mock = MockExecutor::new();
    mock.expect_exec_streaming()
        .withf(|program, args| {
            program == "docker" && args.starts_with(&["buildx".to_owned(), "build".to_owned()])
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let client = DockerClient::with_executor(mock);
    let request = BuildRequest {
        context: PathBuf::from("ctx"),
        tags: vec!["r/g:abc".to_owned()],
        build_args: vec![],
        cache_from: None,
        cache_to: None,
    };
    client.build(&request).await.unwrap();
}

#[tokio::test]
async fn build_failure_is_reported() {
    let mut mock = MockExecutor::new();
    mock.expect_exec_streaming()
        .returning(|_, _| Err(failed("docker")));

    let client = DockerClient::with_executor(mock);
    let request = BuildRequest {
        context: PathBuf::from("ctx"),
        tags: vec![],
        build_args: vec![],
        cache_from: None,
        cache_to: None,
    };
    let err = client.build(&request).await.unwrap_err();
    assert!(matches!(err, ImageBuildError::Build { .. }));
}

// ── Docker: registry ──

#[tokio::test]
async fn login_sends_password_on_stdin_only() {
    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .withf(|program, args, stdin| {
            program == "docker"
                && args.contains(&"--password-stdin".to_owned())
                && !args.iter().any(|a| a.contains("hunter2"))
                && stdin == b"hunter2"
        })
        .times(1)
        .returning(|_, _, _| Ok("Login Succeeded\n".to_owned()));

    let client = DockerClient::with_executor(mock);
    client
        .login("123.dkr.ecr.us-east-1.amazonaws.com", &SecretString::from("hunter2"))
        .await
        .unwrap();
}

#[tokio::test]
async fn publish_pushes_both_tags_with_one_digest() {
    let mut mock = MockExecutor::new();
    let mut seq = mockall::Sequence::new();
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":abc123"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(push_output("abc123", DIGEST_A)));
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":latest"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(push_output("latest", DIGEST_A)));

    let client = DockerClient::with_executor(mock);
    let published = client.publish(&tags()).await.unwrap();

    assert_eq!(published.digest, DIGEST_A);
    assert_eq!(published.tags.latest.tag, "latest");
}

#[tokio::test]
async fn publish_rejects_diverging_digests() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":abc123"))
        .returning(|_, _| Ok(push_output("abc123", DIGEST_A)));
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":latest"))
        .returning(|_, _| Ok(push_output("latest", DIGEST_B)));

    let client = DockerClient::with_executor(mock);
    let err = client.publish(&tags()).await.unwrap_err();

    assert!(matches!(
        err,
        PublishError::DigestMismatch { ref commit, ref latest } if commit == DIGEST_A && latest == DIGEST_B
    ));
}

#[tokio::test]
async fn failed_commit_push_never_pushes_latest() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":abc123"))
        .returning(|_, _| Err(failed("docker")));
    mock.expect_exec()
        .withf(|_, args| is_push_of(args, ":latest"))
        .never();

    let client = DockerClient::with_executor(mock);
    let err = client.publish(&tags()).await.unwrap_err();
    assert!(matches!(err, PublishError::Push { ref tag, .. } if tag.ends_with(":abc123")));
}

#[tokio::test]
async fn push_without_digest_fails() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .returning(|_, _| Ok("Layer already exists\n".to_owned()));

    let client = DockerClient::with_executor(mock);
    let err = client.push(&tags().commit).await.unwrap_err();
    assert!(matches!(err, PublishError::MissingDigest { .. }));
}

// ── AWS: ECR ──

#[tokio::test]
async fn ecr_password_is_trimmed() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|program, args| {
            program == "aws"
                && args.starts_with(&["ecr".to_owned(), "get-login-password".to_owned()])
                && args.contains(&"eu-west-1".to_owned())
        })
        .returning(|_, _| Ok("eyJwYXlsb2Fk\n".to_owned()));

    let client = AwsClient::with_executor(mock);
    let password = client.ecr_login_password("eu-west-1").await.unwrap();
    assert_eq!(secrecy::ExposeSecret::expose_secret(&password), "eyJwYXlsb2Fk");
}

#[test]
fn ecr_registry_host() {
    assert_eq!(
        ecr_registry("123456789012", "us-east-1"),
        "123456789012.dkr.ecr.us-east-1.amazonaws.com"
    );
}

// ── AWS: Lightsail ──

#[tokio::test]
async fn create_deployment_pipes_descriptor_on_stdin() {
    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .withf(|program, args, stdin| {
            let body: serde_json::Value = match serde_json::from_slice(stdin) {
                Ok(v) => v,
                Err(_) => return false,
            };
            program == "aws"
                && args.contains(&"create-container-service-deployment".to_owned())
                && args.contains(&"file:///dev/stdin".to_owned())
                && !args.iter().any(|a| a.contains("very-secret"))
                && body["publicEndpoint"]["containerPort"] == 8080
                && body["publicEndpoint"]["healthCheck"]["path"] == "/health"
                && body["containers"]["giftless"]["environment"]["AWS_SECRET_ACCESS_KEY"]
                    == "very-secret"
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(r#"{"containerService": {"containerServiceName": "giftless", "state": "DEPLOYING",
                 "nextDeployment": {"version": 7, "state": "ACTIVATING"}}}"#
                .to_owned())
        });

    let client = AwsClient::with_executor(mock);
    let receipt = client
        .create_deployment("us-east-1", &descriptor())
        .await
        .unwrap();

    assert_eq!(receipt.state, DeploymentState::Submitted);
    assert_eq!(receipt.version, Some(7));
}

#[tokio::test]
async fn rejected_deployment_is_fatal() {
    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .times(1)
        .returning(|_, _, _| Err(failed("aws")));

    let client = AwsClient::with_executor(mock);
    let err = client
        .create_deployment("us-east-1", &descriptor())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Submit { .. }));
}

#[tokio::test]
async fn service_status_maps_states() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|_, args| args.contains(&"get-container-services".to_owned()))
        .returning(|_, _| {
            Ok(r#"{"containerServices": [{
                "containerServiceName": "giftless",
                "state": "RUNNING",
                "url": "https://giftless.abc.us-east-1.cs.amazonlightsail.com/",
                "currentDeployment": {"version": 6, "state": "ACTIVE"},
                "nextDeployment": {"version": 7, "state": "FAILED"}
            }]}"#
                .to_owned())
        });

    let client = AwsClient::with_executor(mock);
    let status = client.service_status("us-east-1", "giftless").await.unwrap();

    assert_eq!(status.service_state, "RUNNING");
    let current = status.current.unwrap();
    assert_eq!(current.version, Some(6));
    assert_eq!(current.state, Some(DeploymentState::Healthy));
    assert_eq!(
        status.next.unwrap().state,
        Some(DeploymentState::UnhealthyRollback)
    );
}

#[tokio::test]
async fn service_status_inactive_current_is_not_a_rollback() {
    let mut mock = MockExecutor::new();
    mock.expect_exec().returning(|_, _| {
        Ok(r#"{"containerServices": [{
            "containerServiceName": "giftless",
            "state": "UPDATING",
            "currentDeployment": {"version": 6, "state": "INACTIVE"},
            "nextDeployment": {"version": 7, "state": "INACTIVE"}
        }]}"#
            .to_owned())
    });

    let client = AwsClient::with_executor(mock);
    let status = client.service_status("us-east-1", "giftless").await.unwrap();

    let current = status.current.unwrap();
    assert_eq!(current.state, None);
    assert_eq!(current.raw_state, "INACTIVE");
    assert_eq!(
        status.next.unwrap().state,
        Some(DeploymentState::UnhealthyRollback)
    );
}

#[tokio::test]
async fn service_status_unknown_service() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .returning(|_, _| Ok(r#"{"containerServices": []}"#.to_owned()));

    let client = AwsClient::with_executor(mock);
    let err = client.service_status("us-east-1", "nope").await.unwrap_err();
    assert!(matches!(err, DeployError::ServiceNotFound(ref name) if name == "nope"));
}

// ── Doctor ──

#[tokio::test]
async fn doctor_runs_every_check_without_early_return() {
    let mut docker = MockExecutor::new();
    docker
        .expect_exec()
        .times(2)
        .returning(|program, _| {
            Err(CommandError::NotFound {
                program: program.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        });

    let mut aws = MockExecutor::new();
    aws.expect_exec()
        .withf(|_, args| args == ["--version"])
        .returning(|_, _| Ok("aws-cli/2.15.0 Python/3.11.6 Linux/6.5.0\n".to_owned()));
    aws.expect_exec()
        .withf(|_, args| args.contains(&"get-caller-identity".to_owned()))
        .returning(|_, _| Ok("123456789012\n".to_owned()));

    let mut git = MockExecutor::new();
    git.expect_exec()
        .withf(|program, args| program == "git" && args == ["--version"])
        .returning(|_, _| Ok("git version 2.43.0\n".to_owned()));

    let docker = DockerClient::with_executor(docker);
    let aws = AwsClient::with_executor(aws);
    let report = check_tools(&docker, &aws, &git).await;

    assert!(!report.docker.passed);
    assert!(!report.buildx.passed);
    assert!(report.aws.passed);
    assert_eq!(report.aws.detail, "aws-cli/2.15.0 (account 123456789012)");
    assert!(report.git.passed);
    assert!(!report.all_passed());
}
