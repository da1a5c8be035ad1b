use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    SyntaxError,
    UnsupportedConstruct,
    MissingEntryPoint,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::SyntaxError => write!(f, "SyntaxError"),
            CompileErrorKind::UnsupportedConstruct => write!(f, "UnsupportedConstruct"),
            CompileErrorKind::MissingEntryPoint => write!(f, "MissingEntryPoint"),
        }
    }
}

/// Compilation failure; no unit exists when this is returned
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub detail: String,
    /// 1-based line in the submitted source, when known
    pub line: Option<usize>,
}

impl CompileError {
    pub fn syntax(detail: impl Into<String>, line: usize) -> Self {
        Self {
            kind: CompileErrorKind::SyntaxError,
            detail: detail.into(),
            line: Some(line),
        }
    }

    pub fn unsupported(detail: impl Into<String>, line: usize) -> Self {
        Self {
            kind: CompileErrorKind::UnsupportedConstruct,
            detail: detail.into(),
            line: Some(line),
        }
    }

    pub fn missing_entry_point(name: &str) -> Self {
        Self {
            kind: CompileErrorKind::MissingEntryPoint,
            detail: format!("expected a top-level definition named `{}`", name),
            line: None,
        }
    }

    /// Message shown to the learner in the single diagnostic check
    pub fn learner_message(&self) -> String {
        let location = self
            .line
            .map(|line| format!(" at line {}", line))
            .unwrap_or_default();
        match self.kind {
            CompileErrorKind::SyntaxError => {
                format!("Compilation failed: syntax error{}: {}", location, self.detail)
            }
            CompileErrorKind::UnsupportedConstruct => {
                format!("Compilation failed: unsupported construct{}: {}", location, self.detail)
            }
            CompileErrorKind::MissingEntryPoint => format!("Compilation failed: {}", self.detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    ForbiddenOperation,
    Threw,
    TimedOut,
    ResourceExceeded,
}

impl ExecutionErrorKind {
    /// True when the code was stopped by a limit rather than failing on its own
    pub fn is_limit(&self) -> bool {
        matches!(self, ExecutionErrorKind::TimedOut | ExecutionErrorKind::ResourceExceeded)
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::ForbiddenOperation => write!(f, "ForbiddenOperation"),
            ExecutionErrorKind::Threw => write!(f, "Threw"),
            ExecutionErrorKind::TimedOut => write!(f, "TimedOut"),
            ExecutionErrorKind::ResourceExceeded => write!(f, "ResourceExceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub detail: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::ForbiddenOperation, detail)
    }

    pub fn threw(detail: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Threw, detail)
    }

    pub fn timed_out(limit_ms: u64) -> Self {
        Self::new(
            ExecutionErrorKind::TimedOut,
            format!("exceeded the time limit of {}ms", limit_ms),
        )
    }

    pub fn resource(detail: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::ResourceExceeded, detail)
    }

    /// Phrase used inside check messages, e.g. "threw TypeError: x is undefined"
    pub fn describe(&self) -> String {
        match self.kind {
            ExecutionErrorKind::ForbiddenOperation => format!("uses a forbidden operation: {}", self.detail),
            ExecutionErrorKind::Threw => format!("threw {}", self.detail),
            ExecutionErrorKind::TimedOut | ExecutionErrorKind::ResourceExceeded => self.detail.clone(),
        }
    }
}

/// Configuration-level faults; the only errors that reach the caller
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown challenge: {0}")]
    UnknownChallenge(String),

    #[error("invalid challenge definition: {0}")]
    InvalidChallenge(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learner_messages() {
        let err = CompileError::syntax("unexpected token `}`", 3);
        assert_eq!(
            err.learner_message(),
            "Compilation failed: syntax error at line 3: unexpected token `}`"
        );

        let err = CompileError::missing_entry_point("twoSum");
        assert_eq!(
            err.learner_message(),
            "Compilation failed: expected a top-level definition named `twoSum`"
        );
    }

    #[test]
    fn test_execution_error_description() {
        assert_eq!(
            ExecutionError::timed_out(2000).describe(),
            "exceeded the time limit of 2000ms"
        );
        assert_eq!(
            ExecutionError::threw("TypeError: nope").describe(),
            "threw TypeError: nope"
        );
    }
}
