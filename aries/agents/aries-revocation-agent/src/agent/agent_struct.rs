use std::sync::Arc;

use url::Url;

use crate::{
    didcomm::{events::EventBus, transport::InMemoryTransport},
    handlers::{
        connection::ServiceConnections, holder::ServiceCredentialsHolder,
        issuer::ServiceCredentialsIssuer, out_of_band::ServiceOutOfBand,
        revocation_registry::ServiceRevocationRegistries,
    },
    ledger::AnoncredsLedger,
};

#[derive(Clone)]
pub struct Agent {
    pub(super) label: String,
    pub(super) issuer_did: String,
    pub(super) service_endpoint: Url,
    pub(super) ledger: Arc<dyn AnoncredsLedger>,
    pub(super) transport: Arc<InMemoryTransport>,
    pub(super) events: EventBus,
    pub(super) connections: Arc<ServiceConnections>,
    pub(super) out_of_band: Arc<ServiceOutOfBand>,
    pub(super) rev_regs: Arc<ServiceRevocationRegistries>,
    pub(super) issuer: Arc<ServiceCredentialsIssuer>,
    pub(super) holder: Arc<ServiceCredentialsHolder>,
}

impl Agent {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn issuer_did(&self) -> String {
        self.issuer_did.clone()
    }

    pub fn service_endpoint(&self) -> &Url {
        &self.service_endpoint
    }

    pub fn ledger(&self) -> Arc<dyn AnoncredsLedger> {
        self.ledger.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn connections(&self) -> Arc<ServiceConnections> {
        self.connections.clone()
    }

    pub fn out_of_band(&self) -> Arc<ServiceOutOfBand> {
        self.out_of_band.clone()
    }

    pub fn rev_regs(&self) -> Arc<ServiceRevocationRegistries> {
        self.rev_regs.clone()
    }

    pub fn issuer(&self) -> Arc<ServiceCredentialsIssuer> {
        self.issuer.clone()
    }

    pub fn holder(&self) -> Arc<ServiceCredentialsHolder> {
        self.holder.clone()
    }
}
