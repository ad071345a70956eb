use thiserror::Error;

/// Result alias for dataset management operations.
pub type ZcmResult<T> = Result<T, ZcmError>;

#[derive(Error, Debug)]
pub enum ZcmError {
    #[error("[ZC1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[ZC1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[ZC1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[ZC1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[ZC1200] validation error: {0}")]
    Validation(String),

    /// The tool exited non-zero. `stderr` is kept verbatim.
    #[error("[ZC2000] zfs {verb} failed: {stderr}")]
    CommandFailed { verb: String, stderr: String },

    #[error("[ZC2001] unexpected zfs output: {0}")]
    Parse(String),
}

impl ZcmError {
    /// Stable code printed in front of every message.
    pub fn code(&self) -> &'static str {
        match self {
            ZcmError::Io(_) => "ZC1000",
            ZcmError::Toml(_) => "ZC1001",
            ZcmError::Yaml(_) => "ZC1002",
            ZcmError::InvalidConfig(_) => "ZC1100",
            ZcmError::Validation(_) => "ZC1200",
            ZcmError::CommandFailed { .. } => "ZC2000",
            ZcmError::Parse(_) => "ZC2001",
        }
    }

    /// Shorthand used by the command layer when a child exits non-zero.
    pub fn command_failed(verb: impl Into<String>, stderr: impl Into<String>) -> Self {
        ZcmError::CommandFailed {
            verb: verb.into(),
            stderr: stderr.into(),
        }
    }

    /// True when the tool itself rejected the call.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, ZcmError::CommandFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_keeps_stderr_verbatim() {
        let err = ZcmError::command_failed(
            "destroy",
            "cannot destroy 'tank/data@v1': snapshot has dependent clones\n",
        );
        match &err {
            ZcmError::CommandFailed { verb, stderr } => {
                assert_eq!(verb, "destroy");
                assert!(stderr.ends_with("dependent clones\n"));
            }
            other => panic!("unexpected variant {:?}", other),
        }
        assert_eq!(err.code(), "ZC2000");
        assert!(err.is_command_failure());
    }

    #[test]
    fn validation_errors_are_not_command_failures() {
        let err = ZcmError::Validation("clone name is required".into());
        assert_eq!(err.code(), "ZC1200");
        assert!(!err.is_command_failure());
        assert!(err.to_string().contains("clone name is required"));
    }
}
