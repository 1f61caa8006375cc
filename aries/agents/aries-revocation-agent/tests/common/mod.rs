use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Once},
};

use aries_revocation_agent::{
    agent::build_in_memory_ledger,
    didcomm::transport::InMemoryTransport,
    ledger::in_memory::InMemoryLedger,
    orchestration::{
        listener::{CredentialEventListener, ListenerHandle},
        registrar::{CredentialArtifacts, LedgerObjectRegistrar, RegistrarConfig, RevocationArtifacts},
    },
    Agent, AgentConfig, RevocationStrategy,
};
use tails_file_service::server::{spawn_tails_server, TailsServerHandle, TailsStore};
use tempfile::TempDir;
use url::Url;

static LOGGING_INIT: Once = Once::new();

pub fn setup_logging() {
    LOGGING_INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}

pub struct TestNetwork {
    pub config: AgentConfig,
    pub ledger: Arc<InMemoryLedger>,
    pub issuer: Agent,
    pub holder: Agent,
    pub tails_server: TailsServerHandle,
    pub tails_server_dir: TempDir,
    _tails_dir: TempDir,
}

pub fn test_config(tails_dir: &TempDir, strategy: RevocationStrategy) -> AgentConfig {
    AgentConfig {
        tails_dir: tails_dir.path().to_path_buf(),
        settle_timeout_ms: 2_000,
        poll_interval_ms: 5,
        connection_timeout_ms: 2_000,
        issuance_timeout_ms: 2_000,
        revocation_strategy: strategy,
        tails_upload_attempts: 1,
        ledger_pending_polls: 1,
        ..AgentConfig::default()
    }
}

impl TestNetwork {
    pub async fn start(strategy: RevocationStrategy) -> Self {
        Self::assemble(strategy, None).await
    }

    /// Tails files are pushed to `tails_server_url` instead of the network's own tails server.
    pub async fn start_with_tails_url(tails_server_url: Url) -> Self {
        Self::assemble(RevocationStrategy::PerCredential, Some(tails_server_url)).await
    }

    async fn assemble(strategy: RevocationStrategy, tails_server_url: Option<Url>) -> Self {
        setup_logging();
        let tails_dir = tempfile::tempdir().unwrap();
        let tails_server_dir = tempfile::tempdir().unwrap();
        let store = TailsStore::new(tails_server_dir.path()).unwrap();
        let tails_server = spawn_tails_server(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), store)
            .await
            .unwrap();
        let mut config = test_config(&tails_dir, strategy);
        config.tails_server_url =
            Some(tails_server_url.unwrap_or_else(|| tails_server.base_url().clone()));

        let ledger = build_in_memory_ledger(&config, config.tails_server_url.clone());
        let transport = Arc::new(InMemoryTransport::new());
        let issuer = Agent::initialize(
            "Faber College",
            &config.issuer_did,
            ledger.clone(),
            transport.clone(),
        )
        .unwrap();
        let holder =
            Agent::initialize("Alice", &config.issuer_did, ledger.clone(), transport).unwrap();
        Self {
            config,
            ledger,
            issuer,
            holder,
            tails_server,
            tails_server_dir,
            _tails_dir: tails_dir,
        }
    }

    pub fn registrar(&self) -> LedgerObjectRegistrar {
        LedgerObjectRegistrar::new(
            self.issuer.ledger(),
            self.issuer.rev_regs(),
            RegistrarConfig {
                settle_timeout: self.config.settle_timeout(),
                poll_interval: self.config.poll_interval(),
                ..RegistrarConfig::default()
            },
        )
    }

    pub async fn register(
        &self,
        schema: &aries_revocation_agent::ledger::SchemaTemplate,
        capacity: u32,
    ) -> (CredentialArtifacts, RevocationArtifacts) {
        let registrar = self.registrar();
        let credential = registrar
            .register_credential_artifacts(schema, &self.config.issuer_did)
            .await
            .unwrap();
        let revocation = registrar
            .register_revocation_artifacts(&credential.cred_def_id, &self.config.issuer_did, capacity)
            .await
            .unwrap();
        (credential, revocation)
    }

    pub fn start_holder_listener(&self) -> ListenerHandle {
        CredentialEventListener::new(self.holder.holder(), self.holder.events().clone()).start()
    }

    pub fn shutdown(self) {
        self.issuer.shutdown();
        self.holder.shutdown();
        self.tails_server.shutdown();
    }
}
