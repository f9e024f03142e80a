#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program} not found on PATH")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} command failed: {args:?}\n{stderr}")]
    CommandFailed {
        program: String,
        args: Vec<String>,
        stderr: String,
    },

    #[error("{program} output was not valid UTF-8")]
    InvalidUtf8 {
        program: String,
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write to {program} stdin")]
    StdinWrite {
        program: String,
        source: std::io::Error,
    },
}

impl CommandError {
    /// Whether the program itself is missing, as opposed to failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
