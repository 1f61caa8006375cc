#[macro_use]
extern crate log;

pub mod agent;
pub mod didcomm;
mod error;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod orchestration;
mod storage;
pub mod tails;

pub use agent::{Agent, AgentConfig, RevocationStrategy};
pub use error::*;
