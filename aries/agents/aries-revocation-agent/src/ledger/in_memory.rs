use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use rand::RngCore;
use tails_file_service::tails_hash;

use super::{
    AnoncredsLedger, CredentialDefinitionRecord, RegistrationOutcome, RegistrationStep,
    RevocationRegistryDefinition, RevocationStatusList, SchemaRecord, SchemaTemplate,
};
use crate::{
    error::*,
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
    tails::TailsFileService,
};

const TAILS_FILE_VERSION: [u8; 2] = [0, 2];
const TAIL_SIZE: usize = 128;
/// Largest registry whose tails file is generated; 4 MiB of tails.
pub const MAX_CRED_NUM: u32 = 32_768;

#[derive(Clone, Debug)]
pub struct InMemoryLedgerConfig {
    pub tails_dir: PathBuf,
    /// Number of `registration_state` queries a registration stays `pending` for.
    pub pending_polls: u32,
}

/// Ledger kept in process memory. Objects become resolvable only once their registration has
/// settled, the way a network ledger only serves written transactions.
pub struct InMemoryLedger {
    config: InMemoryLedgerConfig,
    tails_service: Arc<dyn TailsFileService>,
    schemas: AgentStorageInMem<SchemaRecord>,
    cred_defs: AgentStorageInMem<CredentialDefinitionRecord>,
    rev_reg_defs: AgentStorageInMem<RevocationRegistryDefinition>,
    status_lists: AgentStorageInMem<RevocationStatusList>,
    pending: Mutex<HashMap<String, u32>>,
    seq_no: AtomicU64,
}

fn status_list_key(rev_reg_def_id: &str) -> String {
    format!("{rev_reg_def_id}/status-list")
}

fn pending_key(step: RegistrationStep, id: &str) -> String {
    match step {
        RegistrationStep::RevocationStatusList => status_list_key(id),
        _ => id.to_string(),
    }
}

impl InMemoryLedger {
    pub fn new(config: InMemoryLedgerConfig, tails_service: Arc<dyn TailsFileService>) -> Self {
        Self {
            config,
            tails_service,
            schemas: AgentStorageInMem::new("ledger-schemas"),
            cred_defs: AgentStorageInMem::new("ledger-cred-defs"),
            rev_reg_defs: AgentStorageInMem::new("ledger-rev-reg-defs"),
            status_lists: AgentStorageInMem::new("ledger-status-lists"),
            pending: Mutex::new(HashMap::new()),
            seq_no: AtomicU64::new(1000),
        }
    }

    fn next_seq_no(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_pending(&self) -> AgentResult<std::sync::MutexGuard<'_, HashMap<String, u32>>> {
        self.pending.lock().map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::LockError,
                "[InMemoryLedger] Unable to lock pending registrations",
            )
        })
    }

    fn is_settled(&self, key: &str) -> AgentResult<bool> {
        Ok(!self.lock_pending()?.contains_key(key))
    }

    /// Reports a written object as `pending` if the ledger is configured to settle lazily.
    fn written(&self, step: RegistrationStep, id: &str) -> AgentResult<RegistrationOutcome> {
        if self.config.pending_polls == 0 {
            return Ok(RegistrationOutcome::finished(id));
        }
        self.lock_pending()?
            .insert(pending_key(step, id), self.config.pending_polls);
        Ok(RegistrationOutcome::pending(id))
    }

    fn resolvable<T: Clone>(
        &self,
        storage: &AgentStorageInMem<T>,
        key: &str,
        id: &str,
    ) -> AgentResult<T> {
        if !self.is_settled(key)? {
            return Err(AgentError::from_msg(
                AgentErrorKind::NotFound,
                &format!("[InMemoryLedger] Object {} is not written to the ledger yet", id),
            ));
        }
        storage.get(key)
    }

    async fn generate_tails_file(&self, max_cred_num: u32) -> AgentResult<(String, PathBuf)> {
        let mut content = vec![0u8; TAILS_FILE_VERSION.len() + TAIL_SIZE * max_cred_num as usize];
        content[..TAILS_FILE_VERSION.len()].copy_from_slice(&TAILS_FILE_VERSION);
        rand::thread_rng().fill_bytes(&mut content[TAILS_FILE_VERSION.len()..]);
        let hash = tails_hash(&content);

        tokio::fs::create_dir_all(&self.config.tails_dir).await?;
        let path = self.config.tails_dir.join(&hash);
        tokio::fs::write(&path, &content).await?;
        debug!(
            "InMemoryLedger::generate_tails_file >> wrote {} bytes to {}",
            content.len(),
            path.display()
        );
        Ok((hash, path))
    }
}

#[async_trait]
impl AnoncredsLedger for InMemoryLedger {
    async fn register_schema(
        &self,
        issuer_id: &str,
        template: &SchemaTemplate,
    ) -> AgentResult<RegistrationOutcome> {
        trace!(
            "InMemoryLedger::register_schema >> issuer_id: {}, name: {}, version: {}",
            issuer_id,
            template.name,
            template.version
        );
        if template.attr_names.is_empty() {
            return Ok(RegistrationOutcome::failed(
                "schema must declare at least one attribute",
            ));
        }
        let id = format!(
            "{}/anoncreds/v0/SCHEMA/{}/{}",
            issuer_id, template.name, template.version
        );
        if self.schemas.contains_key(&id) {
            return Ok(RegistrationOutcome::failed(&format!(
                "schema {id} already exists"
            )));
        }
        let schema = SchemaRecord {
            id: id.clone(),
            issuer_id: issuer_id.to_string(),
            name: template.name.clone(),
            version: template.version.clone(),
            attr_names: template.attr_names.clone(),
        };
        self.schemas.insert(&id, schema)?;
        self.written(RegistrationStep::Schema, &id)
    }

    async fn register_credential_definition(
        &self,
        issuer_id: &str,
        schema_id: &str,
        tag: &str,
        support_revocation: bool,
    ) -> AgentResult<RegistrationOutcome> {
        trace!(
            "InMemoryLedger::register_credential_definition >> schema_id: {}, tag: {}",
            schema_id,
            tag
        );
        if self.get_schema(schema_id).await.is_err() {
            return Ok(RegistrationOutcome::failed(&format!(
                "schema {schema_id} not found"
            )));
        }
        let id = format!(
            "{}/anoncreds/v0/CLAIM_DEF/{}/{}",
            issuer_id,
            self.next_seq_no(),
            tag
        );
        let cred_def = CredentialDefinitionRecord {
            id: id.clone(),
            schema_id: schema_id.to_string(),
            issuer_id: issuer_id.to_string(),
            tag: tag.to_string(),
            support_revocation,
        };
        self.cred_defs.insert(&id, cred_def)?;
        self.written(RegistrationStep::CredentialDefinition, &id)
    }

    async fn register_revocation_registry_definition(
        &self,
        issuer_id: &str,
        cred_def_id: &str,
        tag: &str,
        max_cred_num: u32,
    ) -> AgentResult<RegistrationOutcome> {
        trace!(
            "InMemoryLedger::register_revocation_registry_definition >> cred_def_id: {}, tag: {}, \
             max_cred_num: {}",
            cred_def_id,
            tag,
            max_cred_num
        );
        let cred_def = match self.get_credential_definition(cred_def_id).await {
            Ok(cred_def) => cred_def,
            Err(_) => {
                return Ok(RegistrationOutcome::failed(&format!(
                    "credential definition {cred_def_id} not found"
                )))
            }
        };
        if !cred_def.support_revocation {
            return Ok(RegistrationOutcome::failed(&format!(
                "credential definition {cred_def_id} does not support revocation"
            )));
        }
        if max_cred_num == 0 {
            return Ok(RegistrationOutcome::failed(
                "maximum credential number must be positive",
            ));
        }
        if max_cred_num > MAX_CRED_NUM {
            return Ok(RegistrationOutcome::failed(&format!(
                "maximum credential number {max_cred_num} exceeds {MAX_CRED_NUM}"
            )));
        }

        let (tails_hash, tails_location) = self.generate_tails_file(max_cred_num).await?;
        let id = format!(
            "{}/anoncreds/v0/REV_REG_DEF/{}/{}/{}",
            issuer_id,
            self.next_seq_no(),
            cred_def.tag,
            tag
        );
        let mut rev_reg_def = RevocationRegistryDefinition {
            id: id.clone(),
            issuer_id: issuer_id.to_string(),
            cred_def_id: cred_def_id.to_string(),
            tag: tag.to_string(),
            max_cred_num,
            tails_hash,
            tails_location,
            tails_file_url: None,
        };
        match self.tails_service.upload_tails_file(&rev_reg_def).await {
            Ok(url) => rev_reg_def.tails_file_url = Some(url),
            Err(err) => {
                return Ok(RegistrationOutcome::failed(&format!(
                    "tails file upload failed: {err}"
                )))
            }
        }
        self.rev_reg_defs.insert(&id, rev_reg_def)?;
        self.written(RegistrationStep::RevocationRegistryDefinition, &id)
    }

    async fn register_revocation_status_list(
        &self,
        issuer_id: &str,
        rev_reg_def_id: &str,
    ) -> AgentResult<RegistrationOutcome> {
        trace!(
            "InMemoryLedger::register_revocation_status_list >> rev_reg_def_id: {}",
            rev_reg_def_id
        );
        if self
            .get_revocation_registry_definition(rev_reg_def_id)
            .await
            .is_err()
        {
            return Ok(RegistrationOutcome::failed(&format!(
                "revocation registry definition {rev_reg_def_id} not found"
            )));
        }
        let key = status_list_key(rev_reg_def_id);
        if self.status_lists.contains_key(&key) {
            return Ok(RegistrationOutcome::failed(&format!(
                "status list of {rev_reg_def_id} already registered"
            )));
        }
        self.status_lists
            .insert(&key, RevocationStatusList::new(rev_reg_def_id, issuer_id))?;
        self.written(RegistrationStep::RevocationStatusList, rev_reg_def_id)
    }

    async fn update_revocation_status_list(
        &self,
        rev_reg_def_id: &str,
        revoked_indexes: &[u32],
    ) -> AgentResult<RegistrationOutcome> {
        trace!(
            "InMemoryLedger::update_revocation_status_list >> rev_reg_def_id: {}, indexes: {:?}",
            rev_reg_def_id,
            revoked_indexes
        );
        let rev_reg_def = match self.get_revocation_registry_definition(rev_reg_def_id).await {
            Ok(rev_reg_def) => rev_reg_def,
            Err(err) => return Ok(RegistrationOutcome::failed(err.message())),
        };
        let key = status_list_key(rev_reg_def_id);
        if !self.is_settled(&key)? || !self.status_lists.contains_key(&key) {
            return Ok(RegistrationOutcome::failed(&format!(
                "status list of {rev_reg_def_id} not found"
            )));
        }
        let updated = self.status_lists.update(&key, |list| {
            Ok(list
                .revoke(revoked_indexes, rev_reg_def.max_cred_num)
                .map(|_| list.version))
        })?;
        match updated {
            Ok(version) => {
                debug!(
                    "InMemoryLedger::update_revocation_status_list << {} now at version {}",
                    rev_reg_def_id, version
                );
                Ok(RegistrationOutcome::finished(rev_reg_def_id))
            }
            Err(reason) => Ok(RegistrationOutcome::failed(&reason)),
        }
    }

    async fn registration_state(
        &self,
        step: RegistrationStep,
        id: &str,
    ) -> AgentResult<RegistrationOutcome> {
        let key = pending_key(step, id);
        let mut pending = self.lock_pending()?;
        match pending.get_mut(&key) {
            Some(remaining) if *remaining > 1 => {
                *remaining -= 1;
                return Ok(RegistrationOutcome::pending(id));
            }
            Some(_) => {
                pending.remove(&key);
            }
            None => {}
        }
        drop(pending);

        let known = match step {
            RegistrationStep::Schema => self.schemas.contains_key(&key),
            RegistrationStep::CredentialDefinition => self.cred_defs.contains_key(&key),
            RegistrationStep::RevocationRegistryDefinition => self.rev_reg_defs.contains_key(&key),
            RegistrationStep::RevocationStatusList => self.status_lists.contains_key(&key),
        };
        if known {
            Ok(RegistrationOutcome::finished(id))
        } else {
            Err(AgentError::from_msg(
                AgentErrorKind::NotFound,
                &format!("[InMemoryLedger] No {} registration for id {}", step, id),
            ))
        }
    }

    async fn get_schema(&self, schema_id: &str) -> AgentResult<SchemaRecord> {
        self.resolvable(&self.schemas, schema_id, schema_id)
    }

    async fn get_credential_definition(
        &self,
        cred_def_id: &str,
    ) -> AgentResult<CredentialDefinitionRecord> {
        self.resolvable(&self.cred_defs, cred_def_id, cred_def_id)
    }

    async fn get_revocation_registry_definition(
        &self,
        rev_reg_def_id: &str,
    ) -> AgentResult<RevocationRegistryDefinition> {
        self.resolvable(&self.rev_reg_defs, rev_reg_def_id, rev_reg_def_id)
    }

    async fn get_revocation_status_list(
        &self,
        rev_reg_def_id: &str,
    ) -> AgentResult<RevocationStatusList> {
        self.resolvable(
            &self.status_lists,
            &status_list_key(rev_reg_def_id),
            rev_reg_def_id,
        )
    }
}
