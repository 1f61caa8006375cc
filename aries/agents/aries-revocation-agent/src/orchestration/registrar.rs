use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use url::Url;

use crate::{
    error::*,
    handlers::revocation_registry::ServiceRevocationRegistries,
    ledger::{AnoncredsLedger, RegistrationOutcome, RegistrationState, RegistrationStep, SchemaTemplate},
};

pub const DEFAULT_CRED_DEF_TAG: &str = "latest";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialArtifacts {
    pub schema_id: String,
    pub cred_def_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationArtifacts {
    pub rev_reg_def_id: String,
    pub tails_file_url: Url,
    pub max_cred_num: u32,
}

#[derive(Clone, Debug)]
pub struct RegistrarConfig {
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    pub cred_def_tag: String,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            cred_def_tag: DEFAULT_CRED_DEF_TAG.to_string(),
        }
    }
}

/// Writes the ledger objects credentials are issued against, each only after the one it depends
/// on has settled. Nothing is rolled back when a later step fails.
pub struct LedgerObjectRegistrar {
    ledger: Arc<dyn AnoncredsLedger>,
    rev_regs: Arc<ServiceRevocationRegistries>,
    config: RegistrarConfig,
}

fn registration_error(step: RegistrationStep, reason: &str) -> AgentError {
    AgentError::from_msg(
        AgentErrorKind::LedgerRegistration(step),
        &format!("{} registration failed: {}", step, reason),
    )
}

impl LedgerObjectRegistrar {
    pub fn new(
        ledger: Arc<dyn AnoncredsLedger>,
        rev_regs: Arc<ServiceRevocationRegistries>,
        config: RegistrarConfig,
    ) -> Self {
        Self {
            ledger,
            rev_regs,
            config,
        }
    }

    /// Follows a registration until it is finished or failed, polling while it is pending.
    async fn settle(
        &self,
        step: RegistrationStep,
        mut outcome: RegistrationOutcome,
    ) -> AgentResult<String> {
        let deadline = Instant::now() + self.config.settle_timeout;
        loop {
            match outcome.state {
                RegistrationState::Finished => {
                    return outcome
                        .id
                        .ok_or_else(|| registration_error(step, "finished without an id"));
                }
                RegistrationState::Failed => {
                    let reason = outcome.reason.as_deref().unwrap_or("no reason given");
                    error!("LedgerObjectRegistrar::settle >> {} failed: {}", step, reason);
                    return Err(registration_error(step, reason));
                }
                RegistrationState::Pending => {
                    let id = outcome
                        .id
                        .clone()
                        .ok_or_else(|| registration_error(step, "pending without an id"))?;
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(
                            "LedgerObjectRegistrar::settle >> {} {} still pending after {:?}",
                            step, id, self.config.settle_timeout
                        );
                        return Err(registration_error(step, "not finished"));
                    }
                    tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
                    outcome = self.ledger.registration_state(step, &id).await?;
                }
            }
        }
    }

    pub async fn register_credential_artifacts(
        &self,
        schema_template: &SchemaTemplate,
        issuer_id: &str,
    ) -> AgentResult<CredentialArtifacts> {
        trace!(
            "LedgerObjectRegistrar::register_credential_artifacts >> schema: {} {}",
            schema_template.name,
            schema_template.version
        );
        let outcome = self.ledger.register_schema(issuer_id, schema_template).await?;
        let schema_id = self.settle(RegistrationStep::Schema, outcome).await?;
        info!("Registered schema {}", schema_id);

        let outcome = self
            .ledger
            .register_credential_definition(issuer_id, &schema_id, &self.config.cred_def_tag, true)
            .await?;
        let cred_def_id = self
            .settle(RegistrationStep::CredentialDefinition, outcome)
            .await?;
        info!("Registered credential definition {}", cred_def_id);

        Ok(CredentialArtifacts {
            schema_id,
            cred_def_id,
        })
    }

    pub async fn register_revocation_artifacts(
        &self,
        cred_def_id: &str,
        issuer_id: &str,
        capacity: u32,
    ) -> AgentResult<RevocationArtifacts> {
        trace!(
            "LedgerObjectRegistrar::register_revocation_artifacts >> cred_def_id: {}, capacity: {}",
            cred_def_id,
            capacity
        );
        let step = RegistrationStep::RevocationRegistryDefinition;
        if capacity == 0 {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidArguments,
                "Revocation registry capacity must be positive",
            ));
        }
        let cred_def = self.ledger.get_credential_definition(cred_def_id).await?;
        if !cred_def.support_revocation {
            return Err(registration_error(
                step,
                &format!("credential definition {} does not support revocation", cred_def_id),
            ));
        }

        let tag = uuid::Uuid::new_v4().to_string();
        let outcome = self
            .ledger
            .register_revocation_registry_definition(issuer_id, cred_def_id, &tag, capacity)
            .await?;
        let rev_reg_def_id = self.settle(step, outcome).await?;
        let rev_reg_def = self
            .ledger
            .get_revocation_registry_definition(&rev_reg_def_id)
            .await?;
        let tails_file_url = rev_reg_def
            .tails_file_url
            .clone()
            .ok_or_else(|| registration_error(step, "tails file was not published"))?;
        info!(
            "Registered revocation registry {} with tails file {}",
            rev_reg_def_id, tails_file_url
        );

        let outcome = self
            .ledger
            .register_revocation_status_list(issuer_id, &rev_reg_def_id)
            .await?;
        self.settle(RegistrationStep::RevocationStatusList, outcome)
            .await?;
        info!("Registered revocation status list of {}", rev_reg_def_id);

        let max_cred_num = rev_reg_def.max_cred_num;
        self.rev_regs.register(rev_reg_def)?;
        Ok(RevocationArtifacts {
            rev_reg_def_id,
            tails_file_url,
            max_cred_num,
        })
    }
}
