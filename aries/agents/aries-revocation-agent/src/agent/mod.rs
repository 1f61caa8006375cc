mod agent_config;
mod agent_struct;
mod init;

pub use agent_config::{AgentConfig, RevocationStrategy, DEFAULT_ISSUER_DID};
pub use agent_struct::Agent;
pub use init::build_in_memory_ledger;
