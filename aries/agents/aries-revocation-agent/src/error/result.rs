use crate::error::*;

pub type AgentResult<T> = Result<T, AgentError>;
