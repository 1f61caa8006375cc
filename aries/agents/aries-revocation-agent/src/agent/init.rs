use std::sync::Arc;

use tails_file_service::{RetryPolicy, TailsFileDistributor};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use crate::{
    agent::{agent_config::AgentConfig, agent_struct::Agent},
    didcomm::{
        events::EventBus,
        messages::AriesMessage,
        transport::{Envelope, InMemoryTransport},
    },
    error::*,
    handlers::{
        connection::{ConnectionRecord, ServiceConnections},
        holder::ServiceCredentialsHolder,
        issuer::ServiceCredentialsIssuer,
        out_of_band::ServiceOutOfBand,
        revocation_registry::ServiceRevocationRegistries,
    },
    ledger::{
        in_memory::{InMemoryLedger, InMemoryLedgerConfig},
        AnoncredsLedger,
    },
    tails::{FullTailsFileService, LocalTailsFileService, TailsFileService},
};

/// Ledger kept in memory, publishing tails files to `tails_server_base_url` or leaving them on
/// the local filesystem when no tails server is given.
pub fn build_in_memory_ledger(
    config: &AgentConfig,
    tails_server_base_url: Option<Url>,
) -> Arc<InMemoryLedger> {
    let tails_service: Arc<dyn TailsFileService> = match tails_server_base_url {
        Some(base_url) => {
            let retry = RetryPolicy {
                max_attempts: config.tails_upload_attempts,
                ..RetryPolicy::default()
            };
            Arc::new(FullTailsFileService::new(
                TailsFileDistributor::new(retry),
                base_url,
            ))
        }
        None => Arc::new(LocalTailsFileService),
    };
    Arc::new(InMemoryLedger::new(
        InMemoryLedgerConfig {
            tails_dir: config.tails_dir.clone(),
            pending_polls: config.ledger_pending_polls,
        },
        tails_service,
    ))
}

impl Agent {
    /// Builds an agent listening on a fresh endpoint of `transport` and starts its inbound
    /// message dispatcher.
    pub fn initialize(
        label: &str,
        issuer_did: &str,
        ledger: Arc<dyn AnoncredsLedger>,
        transport: Arc<InMemoryTransport>,
    ) -> AgentResult<Agent> {
        info!("Agent::initialize >> label: {}", label);
        let service_endpoint = Url::parse(&format!("memory://agent/{}", uuid::Uuid::new_v4()))?;
        let mailbox = transport.register(&service_endpoint)?;

        let events = EventBus::default();
        let out_of_band = Arc::new(ServiceOutOfBand::new(label, service_endpoint.clone()));
        let connections = Arc::new(ServiceConnections::new(
            label,
            service_endpoint.clone(),
            transport.clone(),
            events.clone(),
            out_of_band.clone(),
        ));
        let rev_regs = Arc::new(ServiceRevocationRegistries::new(ledger.clone()));
        let issuer = Arc::new(ServiceCredentialsIssuer::new(
            events.clone(),
            connections.clone(),
            rev_regs.clone(),
        ));
        let holder = Arc::new(ServiceCredentialsHolder::new(
            events.clone(),
            connections.clone(),
        ));

        let agent = Agent {
            label: label.to_string(),
            issuer_did: issuer_did.to_string(),
            service_endpoint,
            ledger,
            transport,
            events,
            connections,
            out_of_band,
            rev_regs,
            issuer,
            holder,
        };
        tokio::spawn(agent.clone().dispatch(mailbox));
        Ok(agent)
    }

    /// Closes the agent's mailbox; the dispatcher stops once queued messages are handled.
    pub fn shutdown(&self) {
        info!("Agent::shutdown >> label: {}", self.label);
        self.transport.unregister(&self.service_endpoint);
    }

    async fn dispatch(self, mut mailbox: UnboundedReceiver<Envelope>) {
        while let Some(envelope) = mailbox.recv().await {
            if let Err(err) = self.handle_envelope(&envelope) {
                error!(
                    "Agent {} failed to handle inbound message: {}",
                    self.label, err
                );
            }
        }
        debug!("Agent::dispatch << mailbox of {} closed", self.label);
    }

    fn connection_of(&self, envelope: &Envelope) -> AgentResult<ConnectionRecord> {
        self.connections
            .find_by_keys(&envelope.recipient_key, &envelope.sender_key)
    }

    pub(crate) fn handle_envelope(&self, envelope: &Envelope) -> AgentResult<()> {
        let message = envelope.unpack()?;
        trace!(
            "Agent::handle_envelope >> {} received {}",
            self.label,
            message.kind()
        );
        match message {
            AriesMessage::ConnectionRequest(request) => {
                self.connections
                    .process_request(request, &envelope.recipient_key)?;
            }
            AriesMessage::ConnectionResponse(response) => {
                self.connections.process_response(response)?;
            }
            AriesMessage::OfferCredential(offer) => {
                let connection = self.connection_of(envelope)?;
                self.holder.process_offer(&connection.id, offer)?;
            }
            AriesMessage::RequestCredential(request) => {
                self.connection_of(envelope)?;
                self.issuer.process_credential_request(request)?;
            }
            AriesMessage::IssueCredential(credential) => {
                self.connection_of(envelope)?;
                self.holder.process_credential(credential)?;
            }
            AriesMessage::CredentialAck(ack) => {
                self.connection_of(envelope)?;
                self.issuer.process_credential_ack(ack)?;
            }
            AriesMessage::RevocationNotification(notification) => {
                self.connection_of(envelope)?;
                self.holder.process_revocation_notification(notification)?;
            }
        }
        Ok(())
    }
}
