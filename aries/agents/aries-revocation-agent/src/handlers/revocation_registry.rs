use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    error::*,
    ledger::{AnoncredsLedger, RevocationRegistryDefinition, RevocationStatusList},
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
};

/// Issuer-side view of its revocation registries: index allocation and the single writer of
/// each registry's status list.
pub struct ServiceRevocationRegistries {
    ledger: Arc<dyn AnoncredsLedger>,
    rev_regs: AgentStorageInMem<RevocationRegistryDefinition>,
    allocations: Mutex<HashMap<String, BTreeSet<u32>>>,
    writers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ServiceRevocationRegistries {
    pub fn new(ledger: Arc<dyn AnoncredsLedger>) -> Self {
        Self {
            ledger,
            rev_regs: AgentStorageInMem::new("rev-regs"),
            allocations: Mutex::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, rev_reg_def: RevocationRegistryDefinition) -> AgentResult<String> {
        self.rev_regs.insert(&rev_reg_def.id.clone(), rev_reg_def)
    }

    pub fn get_rev_reg(&self, rev_reg_id: &str) -> AgentResult<RevocationRegistryDefinition> {
        self.rev_regs.get(rev_reg_id)
    }

    fn lock_allocations(&self) -> AgentResult<MutexGuard<'_, HashMap<String, BTreeSet<u32>>>> {
        self.allocations.lock().map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::LockError,
                "[ServiceRevocationRegistries] Unable to lock index allocations",
            )
        })
    }

    /// Assigns the lowest revocation index of the registry not handed out yet.
    pub fn next_free_index(&self, rev_reg_id: &str) -> AgentResult<u32> {
        let rev_reg = self.get_rev_reg(rev_reg_id)?;
        let mut allocations = self.lock_allocations()?;
        let allocated = allocations.entry(rev_reg_id.to_string()).or_default();
        let index = (1..=rev_reg.max_cred_num)
            .find(|index| !allocated.contains(index))
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::RevocationRegistryFull,
                    &format!(
                        "All {} revocation indexes of {} are assigned",
                        rev_reg.max_cred_num, rev_reg_id
                    ),
                )
            })?;
        allocated.insert(index);
        trace!(
            "ServiceRevocationRegistries::next_free_index << rev_reg_id: {}, index: {}",
            rev_reg_id,
            index
        );
        Ok(index)
    }

    pub fn reserve_index(&self, rev_reg_id: &str, index: u32) -> AgentResult<u32> {
        let rev_reg = self.get_rev_reg(rev_reg_id)?;
        if !rev_reg.is_valid_index(index) {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidRevocationIndex,
                &format!(
                    "Revocation index {} is outside of 1..={} of {}",
                    index, rev_reg.max_cred_num, rev_reg_id
                ),
            ));
        }
        let mut allocations = self.lock_allocations()?;
        if !allocations
            .entry(rev_reg_id.to_string())
            .or_default()
            .insert(index)
        {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidRevocationIndex,
                &format!("Revocation index {} of {} is already assigned", index, rev_reg_id),
            ));
        }
        Ok(index)
    }

    /// Returns an index whose offer never left the agent.
    pub fn release_index(&self, rev_reg_id: &str, index: u32) -> AgentResult<()> {
        if let Some(allocated) = self.lock_allocations()?.get_mut(rev_reg_id) {
            allocated.remove(&index);
        }
        Ok(())
    }

    pub fn allocated_indexes(&self, rev_reg_id: &str) -> AgentResult<BTreeSet<u32>> {
        Ok(self
            .lock_allocations()?
            .get(rev_reg_id)
            .cloned()
            .unwrap_or_default())
    }

    fn writer(&self, rev_reg_id: &str) -> AgentResult<Arc<tokio::sync::Mutex<()>>> {
        let mut writers = self.writers.lock().map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::LockError,
                "[ServiceRevocationRegistries] Unable to lock status list writers",
            )
        })?;
        Ok(writers.entry(rev_reg_id.to_string()).or_default().clone())
    }

    /// Publishes `indexes` as revoked. Updates of one registry never interleave.
    pub async fn revoke(&self, rev_reg_id: &str, indexes: &[u32]) -> AgentResult<()> {
        self.get_rev_reg(rev_reg_id)?;
        let writer = self.writer(rev_reg_id)?;
        let _guard = writer.lock().await;
        debug!(
            "ServiceRevocationRegistries::revoke >> rev_reg_id: {}, indexes: {:?}",
            rev_reg_id, indexes
        );
        let outcome = self
            .ledger
            .update_revocation_status_list(rev_reg_id, indexes)
            .await?;
        if !outcome.is_finished() {
            return Err(AgentError::from_msg(
                AgentErrorKind::RevocationUpdate,
                &format!(
                    "Status list update of {} ended {:?}: {}",
                    rev_reg_id,
                    outcome.state,
                    outcome.reason.as_deref().unwrap_or("no reason given")
                ),
            ));
        }
        Ok(())
    }

    pub async fn get_status_list(&self, rev_reg_id: &str) -> AgentResult<RevocationStatusList> {
        self.ledger.get_revocation_status_list(rev_reg_id).await
    }
}
