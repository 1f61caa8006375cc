use std::{
    net::{Ipv4Addr, SocketAddr},
    process::ExitCode,
    sync::Arc,
};

use aries_revocation_agent::{
    agent::build_in_memory_ledger, didcomm::transport::InMemoryTransport, logging,
    orchestration::lifecycle::{run_lifecycle, LifecyclePlan},
    Agent, AgentConfig, AgentError, AgentErrorKind, AgentResult,
};
use log::{error, info};
use tails_file_service::server::{spawn_tails_server, TailsStore};

const CREDENTIAL_COUNT: usize = 5;
const REGISTRY_CAPACITY: u32 = 10;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    logging::init_logger();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Credential lifecycle failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AgentResult<()> {
    let config = AgentConfig::from_env()?;

    let mut embedded_server = None;
    let tails_server_url = match config.tails_server_url.clone() {
        Some(url) => url,
        None => {
            let store = TailsStore::new(config.tails_dir.join("server"))?;
            let server =
                spawn_tails_server(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), store).await?;
            info!("Started tails server on {}", server.base_url());
            let url = server.base_url().clone();
            embedded_server = Some(server);
            url
        }
    };

    let ledger = build_in_memory_ledger(&config, Some(tails_server_url));
    let transport = Arc::new(InMemoryTransport::new());
    let issuer = Agent::initialize("Faber College", &config.issuer_did, ledger.clone(), transport.clone())?;
    let holder = Agent::initialize("Alice", &config.issuer_did, ledger, transport)?;

    let plan = LifecyclePlan::faber_college(CREDENTIAL_COUNT, REGISTRY_CAPACITY);
    let result = run_lifecycle(&config, &issuer, &holder, &plan).await;
    issuer.shutdown();
    holder.shutdown();
    if let Some(server) = embedded_server {
        server.shutdown();
    }

    let summary = result?;
    info!(
        "Issued {} credentials against {}",
        summary.credential_ids.len(),
        summary.revocation_artifacts.rev_reg_def_id
    );
    info!("Revoked indexes {:?}", summary.report.revoked_indexes());
    if !summary.report.is_complete() {
        let failed: Vec<&str> = summary
            .report
            .failures()
            .map(|outcome| outcome.credential_id.as_str())
            .collect();
        return Err(AgentError::from_msg(
            AgentErrorKind::RevocationUpdate,
            &format!("Revocation incomplete for credentials {:?}", failed),
        ));
    }
    Ok(())
}
