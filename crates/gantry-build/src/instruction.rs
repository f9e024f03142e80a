use std::fmt;

/// One Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Comment(String),
    Arg {
        name: String,
        default: Option<String>,
    },
    Run(String),
    Copy {
        from: Option<String>,
        src: String,
        dest: String,
    },
    User(String),
    Workdir(String),
    Env {
        key: String,
        value: String,
    },
    Expose(u16),
    Entrypoint(Vec<String>),
    Cmd(Vec<String>),
}

impl Instruction {
    pub fn run(cmd: impl Into<String>) -> Self {
        Self::Run(cmd.into())
    }

    pub fn copy(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self::Copy {
            from: None,
            src: src.into(),
            dest: dest.into(),
        }
    }

    pub fn copy_from(stage: &str, src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self::Copy {
            from: Some(stage.to_owned()),
            src: src.into(),
            dest: dest.into(),
        }
    }

    pub fn arg(name: &str, default: impl Into<String>) -> Self {
        Self::Arg {
            name: name.to_owned(),
            default: Some(default.into()),
        }
    }

    pub fn env(key: &str, value: &str) -> Self {
        Self::Env {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }

    /// Whether this instruction changes the image filesystem.
    pub fn mutates_filesystem(&self) -> bool {
        matches!(self, Self::Run(_) | Self::Copy { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "# {text}"),
            Self::Arg { name, default } => match default {
                Some(value) => write!(f, "ARG {name}={}", quote(value)),
                None => write!(f, "ARG {name}"),
            },
            Self::Run(cmd) => write!(f, "RUN {cmd}"),
            Self::Copy { from, src, dest } => match from {
                Some(stage) => write!(f, "COPY --from={stage} {src} {dest}"),
                None => write!(f, "COPY {src} {dest}"),
            },
            Self::User(user) => write!(f, "USER {user}"),
            Self::Workdir(dir) => write!(f, "WORKDIR {dir}"),
            Self::Env { key, value } => write!(f, "ENV {key}={}", quote(value)),
            Self::Expose(port) => write!(f, "EXPOSE {port}"),
            Self::Entrypoint(args) => write!(f, "ENTRYPOINT {}", exec_form(args)),
            Self::Cmd(args) => write!(f, "CMD {}", exec_form(args)),
        }
    }
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) || value.contains('"') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_owned()
    }
}

/// `["a", "b"]`, the JSON array form Docker uses for exec-form commands.
fn exec_form(args: &[String]) -> String {
    let quoted: Vec<String> = args
        .iter()
        .map(|a| serde_json::Value::String(a.clone()).to_string())
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Substitute `${NAME}` and `$NAME` references from `args`.
///
/// Unknown references are left as written.
pub fn expand_args(text: &str, args: &[(String, String)]) -> String {
    let mut out = text.to_owned();
    for (name, value) in args {
        out = out.replace(&format!("${{{name}}}"), value);
    }
    for (name, value) in args {
        let bare = format!("${name}");
        let mut from = 0;
        while let Some(offset) = out[from..].find(&bare) {
            let pos = from + offset;
            let end = pos + bare.len();
            let boundary = out[end..]
                .chars()
                .next()
                .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
            if boundary {
                out.replace_range(pos..end, value);
                from = pos + value.len();
            } else {
                from = end;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_form_is_json() {
        let cmd = Instruction::Entrypoint(vec!["tini".into(), "uwsgi".into(), "--".into()]);
        assert_eq!(cmd.to_string(), r#"ENTRYPOINT ["tini", "uwsgi", "--"]"#);
    }

    #[test]
    fn arg_default_is_quoted_when_it_has_spaces() {
        let arg = Instruction::arg("EXTRA_PACKAGES", "a b");
        assert_eq!(arg.to_string(), r#"ARG EXTRA_PACKAGES="a b""#);
        let arg = Instruction::arg("USER_NAME", "giftless");
        assert_eq!(arg.to_string(), "ARG USER_NAME=giftless");
    }

    #[test]
    fn copy_from_stage() {
        let copy = Instruction::copy_from("builder", "/wheels", "/wheels");
        assert_eq!(copy.to_string(), "COPY --from=builder /wheels /wheels");
        assert!(copy.mutates_filesystem());
        assert!(!Instruction::User("x".into()).mutates_filesystem());
    }

    #[test]
    fn expand_braced_and_bare() {
        let args = vec![("USER_NAME".to_owned(), "giftless".to_owned())];
        assert_eq!(expand_args("${USER_NAME}", &args), "giftless");
        assert_eq!(expand_args("$USER_NAME", &args), "giftless");
        assert_eq!(expand_args("$USER_NAMES", &args), "$USER_NAMES");
        assert_eq!(expand_args("$OTHER", &args), "$OTHER");
    }
}
