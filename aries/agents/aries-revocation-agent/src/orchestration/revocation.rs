use std::collections::{BTreeMap, BTreeSet};

use crate::{agent::Agent, agent::RevocationStrategy, error::*};

const REVOCATION_COMMENT: &str = "Credential revoked by issuer";

/// What happened to one credential of a revocation batch.
#[derive(Clone, Debug, PartialEq)]
pub struct RevocationOutcome {
    pub credential_id: String,
    pub rev_reg_def_id: Option<String>,
    pub revocation_index: Option<u32>,
    /// The status list names the credential's index as revoked.
    pub status_updated: bool,
    /// Revocation id sent to the holder.
    pub notification: Option<String>,
    pub error: Option<AgentError>,
}

impl RevocationOutcome {
    fn new(credential_id: &str) -> Self {
        Self {
            credential_id: credential_id.to_string(),
            rev_reg_def_id: None,
            revocation_index: None,
            status_updated: false,
            notification: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_updated && self.notification.is_some() && self.error.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RevocationReport {
    pub outcomes: Vec<RevocationOutcome>,
}

impl RevocationReport {
    /// Indexes whose status list update went through, whether or not the holder was notified.
    pub fn revoked_indexes(&self) -> BTreeSet<u32> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status_updated)
            .filter_map(|outcome| outcome.revocation_index)
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.notification.clone())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RevocationOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(RevocationOutcome::is_success)
    }
}

/// Revokes issued credentials and lets their holders know. A credential that fails does not
/// stop the rest of the batch.
pub struct RevocationCoordinator {
    strategy: RevocationStrategy,
}

impl RevocationCoordinator {
    pub fn new(strategy: RevocationStrategy) -> Self {
        Self { strategy }
    }

    pub async fn revoke_batch(&self, issuer: &Agent, credential_ids: &[String]) -> RevocationReport {
        trace!(
            "RevocationCoordinator::revoke_batch >> count: {}, strategy: {:?}",
            credential_ids.len(),
            self.strategy
        );
        let mut outcomes: Vec<RevocationOutcome> = credential_ids
            .iter()
            .map(|credential_id| {
                let mut outcome = RevocationOutcome::new(credential_id);
                match issuer.issuer().revocation_target(credential_id) {
                    Ok((rev_reg_def_id, index)) => {
                        outcome.rev_reg_def_id = Some(rev_reg_def_id);
                        outcome.revocation_index = Some(index);
                    }
                    Err(err) => {
                        warn!("Cannot revoke credential {}: {}", credential_id, err);
                        outcome.error = Some(err);
                    }
                }
                outcome
            })
            .collect();

        match self.strategy {
            RevocationStrategy::PerCredential => {
                for outcome in outcomes.iter_mut() {
                    if let (Some(rev_reg_def_id), Some(index)) =
                        (outcome.rev_reg_def_id.clone(), outcome.revocation_index)
                    {
                        match issuer.rev_regs().revoke(&rev_reg_def_id, &[index]).await {
                            Ok(()) => outcome.status_updated = true,
                            Err(err) => {
                                error!(
                                    "Revocation of credential {} failed: {}",
                                    outcome.credential_id, err
                                );
                                outcome.error = Some(err);
                            }
                        }
                        notify(issuer, outcome);
                    }
                }
            }
            RevocationStrategy::Epoch => {
                let mut by_registry: BTreeMap<String, Vec<usize>> = BTreeMap::new();
                for (position, outcome) in outcomes.iter().enumerate() {
                    if let (Some(rev_reg_def_id), Some(_)) =
                        (&outcome.rev_reg_def_id, outcome.revocation_index)
                    {
                        by_registry
                            .entry(rev_reg_def_id.clone())
                            .or_default()
                            .push(position);
                    }
                }
                for (rev_reg_def_id, positions) in by_registry {
                    let indexes: Vec<u32> = positions
                        .iter()
                        .filter_map(|position| outcomes[*position].revocation_index)
                        .collect();
                    let result = issuer.rev_regs().revoke(&rev_reg_def_id, &indexes).await;
                    for position in positions {
                        let outcome = &mut outcomes[position];
                        match &result {
                            Ok(()) => outcome.status_updated = true,
                            Err(err) => outcome.error = Some(err.clone()),
                        }
                    }
                    if let Err(err) = result {
                        error!(
                            "Revocation of {} indexes of {} failed: {}",
                            indexes.len(),
                            rev_reg_def_id,
                            err
                        );
                    }
                }
                for outcome in outcomes.iter_mut() {
                    notify(issuer, outcome);
                }
            }
        }

        let report = RevocationReport { outcomes };
        info!(
            "Revoked indexes {:?}, {} notifications sent, {} failures",
            report.revoked_indexes(),
            report.notifications().len(),
            report.failures().count()
        );
        report
    }
}

fn notify(issuer: &Agent, outcome: &mut RevocationOutcome) {
    if !outcome.status_updated {
        return;
    }
    match issuer
        .issuer()
        .send_revocation_notification(&outcome.credential_id, Some(REVOCATION_COMMENT))
    {
        Ok(revocation_id) => outcome.notification = Some(revocation_id),
        Err(err) => {
            warn!(
                "Revocation notification for credential {} failed: {}",
                outcome.credential_id, err
            );
            outcome.error = Some(err);
        }
    }
}
