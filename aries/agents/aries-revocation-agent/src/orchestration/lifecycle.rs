use std::collections::BTreeMap;

use crate::{
    agent::{Agent, AgentConfig},
    didcomm::events::{await_event, AgentEvent},
    error::*,
    ledger::SchemaTemplate,
    orchestration::{
        connection_broker::{ConnectionBroker, ConnectionPair},
        issuance::{CredentialAttributes, IssuanceCoordinator},
        listener::CredentialEventListener,
        registrar::{CredentialArtifacts, LedgerObjectRegistrar, RegistrarConfig, RevocationArtifacts},
        revocation::{RevocationCoordinator, RevocationReport},
    },
};

#[derive(Clone, Debug)]
pub struct LifecyclePlan {
    pub schema: SchemaTemplate,
    pub capacity: u32,
    pub attribute_sets: Vec<CredentialAttributes>,
}

impl LifecyclePlan {
    /// Degree credentials for Alice, under a schema name unique to this run.
    pub fn faber_college(credential_count: usize, capacity: u32) -> Self {
        let attributes: CredentialAttributes = BTreeMap::from([
            ("name".to_string(), "Alice Smith".to_string()),
            ("degree".to_string(), "Computer Science".to_string()),
            ("date".to_string(), "01/01/2022".to_string()),
        ]);
        Self {
            schema: SchemaTemplate {
                name: format!("Faber College {}", uuid::Uuid::new_v4()),
                version: "1.0.0".to_string(),
                attr_names: attributes.keys().cloned().collect(),
            },
            capacity,
            attribute_sets: vec![attributes; credential_count],
        }
    }
}

#[derive(Clone, Debug)]
pub struct LifecycleSummary {
    pub credential_artifacts: CredentialArtifacts,
    pub revocation_artifacts: RevocationArtifacts,
    pub connection: ConnectionPair,
    pub credential_ids: Vec<String>,
    pub report: RevocationReport,
    /// Revocation ids the holder got notified about, in arrival order.
    pub holder_notifications: Vec<String>,
}

/// Registers ledger objects, connects the agents, issues `plan.attribute_sets` and revokes
/// everything that was issued.
pub async fn run_lifecycle(
    config: &AgentConfig,
    issuer: &Agent,
    holder: &Agent,
    plan: &LifecyclePlan,
) -> AgentResult<LifecycleSummary> {
    let registrar = LedgerObjectRegistrar::new(
        issuer.ledger(),
        issuer.rev_regs(),
        RegistrarConfig {
            settle_timeout: config.settle_timeout(),
            poll_interval: config.poll_interval(),
            ..RegistrarConfig::default()
        },
    );
    let credential_artifacts = registrar
        .register_credential_artifacts(&plan.schema, &issuer.issuer_did())
        .await?;
    let revocation_artifacts = registrar
        .register_revocation_artifacts(
            &credential_artifacts.cred_def_id,
            &issuer.issuer_did(),
            plan.capacity,
        )
        .await?;

    let listener = CredentialEventListener::new(holder.holder(), holder.events().clone()).start();
    let result = issue_and_revoke(
        config,
        issuer,
        holder,
        plan,
        &credential_artifacts,
        &revocation_artifacts,
    )
    .await;
    listener.stop().await?;
    let (connection, credential_ids, report, holder_notifications) = result?;

    Ok(LifecycleSummary {
        credential_artifacts,
        revocation_artifacts,
        connection,
        credential_ids,
        report,
        holder_notifications,
    })
}

async fn issue_and_revoke(
    config: &AgentConfig,
    issuer: &Agent,
    holder: &Agent,
    plan: &LifecyclePlan,
    credential_artifacts: &CredentialArtifacts,
    revocation_artifacts: &RevocationArtifacts,
) -> AgentResult<(ConnectionPair, Vec<String>, RevocationReport, Vec<String>)> {
    let connection = ConnectionBroker::new(config.connection_timeout())
        .establish(issuer, holder)
        .await?;
    let credential_ids = IssuanceCoordinator::new(config.issuance_timeout())
        .issue_batch(
            issuer,
            &connection.issuer_connection_id,
            &credential_artifacts.cred_def_id,
            &revocation_artifacts.rev_reg_def_id,
            &plan.attribute_sets,
        )
        .await?;

    let mut holder_events = holder.events().subscribe();
    let report = RevocationCoordinator::new(config.revocation_strategy)
        .revoke_batch(issuer, &credential_ids)
        .await;

    let mut holder_notifications = Vec::with_capacity(report.notifications().len());
    for _ in report.notifications() {
        let revocation_id = await_event(
            &mut holder_events,
            config.issuance_timeout(),
            "holder revocation notification",
            |event| match event {
                AgentEvent::RevocationNotificationReceived { revocation_id, .. } => {
                    Some(revocation_id.clone())
                }
                _ => None,
            },
        )
        .await?;
        holder_notifications.push(revocation_id);
    }
    Ok((connection, credential_ids, report, holder_notifications))
}
