use std::process::Stdio;

use crate::command::CommandError;

/// Abstraction over external CLI execution (`docker`, `aws`, `git`) for
/// testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` and capture stdout.
    async fn exec(&self, program: &str, args: &[String]) -> Result<String, CommandError>;

    /// Run `program`, streaming its output to the terminal.
    async fn exec_streaming(&self, program: &str, args: &[String]) -> Result<(), CommandError>;

    /// Run `program` with `stdin_data` piped to stdin and capture stdout.
    async fn exec_with_stdin(
        &self,
        program: &str,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, CommandError>;
}

/// Runs commands with `tokio::process`.
pub struct RealExecutor;

impl CommandExecutor for RealExecutor {
    async fn exec(&self, program: &str, args: &[String]) -> Result<String, CommandError> {
        tracing::debug!(program, ?args, "exec");
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| not_found(program, e))?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| CommandError::InvalidUtf8 {
                program: program.to_owned(),
                source: e,
            })
        } else {
            Err(CommandError::CommandFailed {
                program: program.to_owned(),
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    async fn exec_streaming(&self, program: &str, args: &[String]) -> Result<(), CommandError> {
        tracing::debug!(program, ?args, "exec (streaming)");
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| not_found(program, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::CommandFailed {
                program: program.to_owned(),
                args: args.to_vec(),
                stderr: format!("exit code: {status}"),
            })
        }
    }

    async fn exec_with_stdin(
        &self,
        program: &str,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, CommandError> {
        use tokio::io::AsyncWriteExt;

        tracing::debug!(program, ?args, stdin_bytes = stdin_data.len(), "exec (stdin)");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found(program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            let stdin_err = |e| CommandError::StdinWrite {
                program: program.to_owned(),
                source: e,
            };
            stdin.write_all(stdin_data).await.map_err(stdin_err)?;
            stdin.shutdown().await.map_err(stdin_err)?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| not_found(program, e))?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| CommandError::InvalidUtf8 {
                program: program.to_owned(),
                source: e,
            })
        } else {
            Err(CommandError::CommandFailed {
                program: program.to_owned(),
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

fn not_found(program: &str, source: std::io::Error) -> CommandError {
    CommandError::NotFound {
        program: program.to_owned(),
        source,
    }
}

/// `["a", "b"]` into owned args.
pub(crate) fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
