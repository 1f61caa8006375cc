use std::{env, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::*;

pub const DEFAULT_ISSUER_DID: &str = "did:indy:bcovrin:testnet:JM9L6HL2QCexjbn9WB46h9";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationStrategy {
    /// One status list update per credential.
    #[default]
    PerCredential,
    /// One status list update per registry for the whole batch.
    Epoch,
}

impl FromStr for RevocationStrategy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-credential" => Ok(RevocationStrategy::PerCredential),
            "epoch" => Ok(RevocationStrategy::Epoch),
            other => Err(AgentError::from_msg(
                AgentErrorKind::InvalidConfiguration,
                &format!("Unknown revocation strategy {}", other),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub tails_server_url: Option<Url>,
    pub tails_dir: PathBuf,
    pub issuer_did: String,
    pub settle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub connection_timeout_ms: u64,
    pub issuance_timeout_ms: u64,
    pub revocation_strategy: RevocationStrategy,
    pub tails_upload_attempts: u32,
    /// How many state queries an in-memory ledger registration stays pending for.
    pub ledger_pending_polls: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tails_server_url: None,
            tails_dir: env::temp_dir().join("aries-revocation-agent").join("tails"),
            issuer_did: DEFAULT_ISSUER_DID.to_string(),
            settle_timeout_ms: 10_000,
            poll_interval_ms: 100,
            connection_timeout_ms: 5_000,
            issuance_timeout_ms: 10_000,
            revocation_strategy: RevocationStrategy::PerCredential,
            tails_upload_attempts: 3,
            ledger_pending_polls: 1,
        }
    }
}

fn env_var<T>(name: &str) -> AgentResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value.parse().map(Some).map_err(|err: T::Err| {
            AgentError::from_msg(
                AgentErrorKind::InvalidConfiguration,
                &format!("Invalid value {:?} of {}: {}", value, name, err),
            )
        }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(AgentError::from_msg(
            AgentErrorKind::InvalidConfiguration,
            &format!("Unable to read {}: {}", name, err),
        )),
    }
}

impl AgentConfig {
    pub fn from_env() -> AgentResult<Self> {
        let defaults = Self::default();
        let config = Self {
            tails_server_url: env_var("TAILS_SERVER_URL")?,
            tails_dir: env_var("TAILS_DIR")?.unwrap_or(defaults.tails_dir),
            issuer_did: env_var("ISSUER_DID")?.unwrap_or(defaults.issuer_did),
            settle_timeout_ms: env_var("SETTLE_TIMEOUT_MS")?.unwrap_or(defaults.settle_timeout_ms),
            poll_interval_ms: env_var("POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval_ms),
            connection_timeout_ms: env_var("CONNECTION_TIMEOUT_MS")?
                .unwrap_or(defaults.connection_timeout_ms),
            issuance_timeout_ms: env_var("ISSUANCE_TIMEOUT_MS")?
                .unwrap_or(defaults.issuance_timeout_ms),
            revocation_strategy: env_var("REVOCATION_STRATEGY")?
                .unwrap_or(defaults.revocation_strategy),
            tails_upload_attempts: env_var("TAILS_UPLOAD_ATTEMPTS")?
                .unwrap_or(defaults.tails_upload_attempts),
            ledger_pending_polls: env_var("LEDGER_PENDING_POLLS")?
                .unwrap_or(defaults.ledger_pending_polls),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.tails_upload_attempts == 0 {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidConfiguration,
                "TAILS_UPLOAD_ATTEMPTS must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidConfiguration,
                "POLL_INTERVAL_MS must be positive",
            ));
        }
        Ok(())
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn issuance_timeout(&self) -> Duration {
        Duration::from_millis(self.issuance_timeout_ms)
    }
}
