use std::fmt;

use crate::error::AgentErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentError {
    pub message: String,
    pub kind: AgentErrorKind,
}

impl std::error::Error for AgentError {}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl AgentError {
    pub fn from_msg(kind: AgentErrorKind, msg: &str) -> Self {
        AgentError {
            kind,
            message: msg.to_string(),
        }
    }

    pub fn from_kind(kind: AgentErrorKind) -> Self {
        let message = kind.to_string();
        AgentError { message, kind }
    }

    pub fn kind(&self) -> AgentErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
