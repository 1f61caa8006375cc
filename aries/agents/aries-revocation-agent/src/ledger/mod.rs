pub mod in_memory;
pub mod types;

use async_trait::async_trait;

pub use self::types::{
    CredentialDefinitionRecord, RegistrationOutcome, RegistrationState, RegistrationStep,
    RevocationRegistryDefinition, RevocationStatusList, SchemaRecord, SchemaTemplate,
};
use crate::error::AgentResult;

/// AnonCreds object registry. Registration calls report their progress through
/// [`RegistrationOutcome`]; a `pending` registration can be re-queried with
/// [`AnoncredsLedger::registration_state`] until it settles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnoncredsLedger: Send + Sync {
    async fn register_schema(
        &self,
        issuer_id: &str,
        template: &SchemaTemplate,
    ) -> AgentResult<RegistrationOutcome>;

    async fn register_credential_definition(
        &self,
        issuer_id: &str,
        schema_id: &str,
        tag: &str,
        support_revocation: bool,
    ) -> AgentResult<RegistrationOutcome>;

    async fn register_revocation_registry_definition(
        &self,
        issuer_id: &str,
        cred_def_id: &str,
        tag: &str,
        max_cred_num: u32,
    ) -> AgentResult<RegistrationOutcome>;

    async fn register_revocation_status_list(
        &self,
        issuer_id: &str,
        rev_reg_def_id: &str,
    ) -> AgentResult<RegistrationOutcome>;

    /// Adds `revoked_indexes` to the status list of the registry.
    async fn update_revocation_status_list(
        &self,
        rev_reg_def_id: &str,
        revoked_indexes: &[u32],
    ) -> AgentResult<RegistrationOutcome>;

    async fn registration_state(
        &self,
        step: RegistrationStep,
        id: &str,
    ) -> AgentResult<RegistrationOutcome>;

    async fn get_schema(&self, schema_id: &str) -> AgentResult<SchemaRecord>;

    async fn get_credential_definition(
        &self,
        cred_def_id: &str,
    ) -> AgentResult<CredentialDefinitionRecord>;

    async fn get_revocation_registry_definition(
        &self,
        rev_reg_def_id: &str,
    ) -> AgentResult<RevocationRegistryDefinition>;

    async fn get_revocation_status_list(
        &self,
        rev_reg_def_id: &str,
    ) -> AgentResult<RevocationStatusList>;
}
