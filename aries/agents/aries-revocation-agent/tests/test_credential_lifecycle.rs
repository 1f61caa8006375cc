mod common;

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use aries_revocation_agent::{
    didcomm::events::{await_event, AgentEvent},
    handlers::{
        connection::{ConnectionState, PartyRole},
        credential::CredentialState,
        issuer::OfferInfo,
    },
    ledger::{AnoncredsLedger, RegistrationStep},
    orchestration::{
        connection_broker::ConnectionBroker,
        issuance::IssuanceCoordinator,
        lifecycle::{run_lifecycle, LifecyclePlan},
        revocation::RevocationCoordinator,
    },
    AgentErrorKind, RevocationStrategy,
};
use common::TestNetwork;
use tails_file_service::tails_hash;
use tokio::sync::mpsc::unbounded_channel;
use url::Url;

#[tokio::test]
async fn test_issue_five_and_revoke_all() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(5, 10);

    let summary = run_lifecycle(&network.config, &network.issuer, &network.holder, &plan)
        .await
        .unwrap();

    let rev_reg_id = summary.revocation_artifacts.rev_reg_def_id.clone();
    assert_eq!(summary.revocation_artifacts.max_cred_num, 10);
    assert_eq!(summary.credential_ids.len(), 5);
    let distinct: BTreeSet<&String> = summary.credential_ids.iter().collect();
    assert_eq!(distinct.len(), 5);

    let indexes: Vec<u32> = summary
        .credential_ids
        .iter()
        .map(|id| network.issuer.issuer().get_credential(id).unwrap())
        .inspect(|record| assert_eq!(record.state, CredentialState::Done))
        .map(|record| record.revocation_index)
        .collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5]);

    assert_eq!(
        summary.report.revoked_indexes(),
        BTreeSet::from([1, 2, 3, 4, 5])
    );
    assert!(summary.report.is_complete());
    let expected: Vec<String> = (1..=5).map(|i| format!("{rev_reg_id}::{i}")).collect();
    assert_eq!(summary.report.notifications(), expected);
    let received: BTreeSet<String> = summary.holder_notifications.iter().cloned().collect();
    assert_eq!(received, expected.iter().cloned().collect());

    let status_list = network
        .ledger
        .get_revocation_status_list(&rev_reg_id)
        .await
        .unwrap();
    assert_eq!(status_list.revoked_indexes, BTreeSet::from([1, 2, 3, 4, 5]));
    assert_eq!(status_list.version, 6);

    let holder = network.holder.holder();
    let holder_ids = holder.credential_ids().unwrap();
    assert_eq!(holder_ids.len(), 5);
    for id in holder_ids {
        let record = holder.get_credential(&id).unwrap();
        assert_eq!(record.role, PartyRole::Holder);
        assert_eq!(record.state, CredentialState::Done);
        assert_eq!(record.attributes["name"], "Alice Smith");
        let notification = record.revocation_notification.unwrap();
        assert_eq!(
            notification.revocation_id,
            format!("{rev_reg_id}::{}", record.revocation_index)
        );
    }
    network.shutdown();
}

#[tokio::test]
async fn test_tails_file_is_published_by_content_hash() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(1, 4);
    let (_, revocation) = network.register(&plan.schema, plan.capacity).await;

    let rev_reg_def = network
        .ledger
        .get_revocation_registry_definition(&revocation.rev_reg_def_id)
        .await
        .unwrap();
    let expected_url = network
        .tails_server
        .base_url()
        .join(&rev_reg_def.tails_hash)
        .unwrap();
    assert_eq!(revocation.tails_file_url, expected_url);

    let published = std::fs::read(network.tails_server_dir.path().join(&rev_reg_def.tails_hash)).unwrap();
    assert_eq!(tails_hash(&published), rev_reg_def.tails_hash);
    assert_eq!(published, std::fs::read(&rev_reg_def.tails_location).unwrap());
    network.shutdown();
}

#[tokio::test]
async fn test_unreachable_tails_server_fails_rev_reg_registration() {
    let listener = std::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
    let closed = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    drop(listener);
    let network = TestNetwork::start_with_tails_url(closed).await;
    let plan = LifecyclePlan::faber_college(1, 4);
    let registrar = network.registrar();

    let credential = registrar
        .register_credential_artifacts(&plan.schema, &network.config.issuer_did)
        .await
        .unwrap();
    let err = registrar
        .register_revocation_artifacts(&credential.cred_def_id, &network.config.issuer_did, 4)
        .await
        .unwrap_err();
    assert_eq!(
        err.kind(),
        AgentErrorKind::LedgerRegistration(RegistrationStep::RevocationRegistryDefinition)
    );
    assert!(err.message().contains("tails file upload failed"));
    network.shutdown();
}

#[tokio::test]
async fn test_connection_records_share_out_of_band_id() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;

    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();

    let issuer_record = network
        .issuer
        .connections()
        .get_by_id(&pair.issuer_connection_id)
        .unwrap();
    let holder_record = network
        .holder
        .connections()
        .get_by_id(&pair.holder_connection_id)
        .unwrap();
    assert_eq!(issuer_record.out_of_band_id, pair.out_of_band_id);
    assert_eq!(holder_record.out_of_band_id, pair.out_of_band_id);
    assert_eq!(issuer_record.state, ConnectionState::Completed);
    assert_eq!(holder_record.state, ConnectionState::Completed);
    assert_eq!(issuer_record.role, PartyRole::Issuer);
    assert_eq!(holder_record.role, PartyRole::Holder);
    assert_eq!(issuer_record.their_key, holder_record.our_key);
    assert_eq!(holder_record.their_key, issuer_record.our_key);
    network.shutdown();
}

#[tokio::test]
async fn test_credential_beyond_capacity_fails_registry_full() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(5, 5);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let listener = network.start_holder_listener();
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();
    let coordinator = IssuanceCoordinator::new(network.config.issuance_timeout());

    let ids = coordinator
        .issue_batch(
            &network.issuer,
            &pair.issuer_connection_id,
            &credential.cred_def_id,
            &revocation.rev_reg_def_id,
            &plan.attribute_sets,
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 5);

    let err = coordinator
        .issue(
            &network.issuer,
            &pair.issuer_connection_id,
            OfferInfo::new(
                &credential.cred_def_id,
                &revocation.rev_reg_def_id,
                plan.attribute_sets[0].clone(),
            ),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::RevocationRegistryFull);

    listener.stop().await.unwrap();
    network.shutdown();
}

#[tokio::test]
async fn test_explicit_index_is_used_once() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(1, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let (observer, mut completed) = unbounded_channel();
    let listener = aries_revocation_agent::orchestration::listener::CredentialEventListener::new(
        network.holder.holder(),
        network.holder.events().clone(),
    )
    .with_observer(observer)
    .start();
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();
    let coordinator = IssuanceCoordinator::new(network.config.issuance_timeout());
    let offer = OfferInfo {
        revocation_index: Some(7),
        ..OfferInfo::new(
            &credential.cred_def_id,
            &revocation.rev_reg_def_id,
            plan.attribute_sets[0].clone(),
        )
    };

    let credential_id = coordinator
        .issue(&network.issuer, &pair.issuer_connection_id, offer.clone())
        .await
        .unwrap();
    let issued = network.issuer.issuer().get_credential(&credential_id).unwrap();
    assert_eq!(issued.revocation_index, 7);
    assert_eq!(issued.tag("anonCredsCredentialRevocationId"), Some("7"));
    let received = completed.recv().await.unwrap();
    assert_eq!(received.revocation_index, 7);
    assert_eq!(received.rev_reg_def_id, revocation.rev_reg_def_id);

    let err = coordinator
        .issue(&network.issuer, &pair.issuer_connection_id, offer)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::InvalidRevocationIndex);

    listener.stop().await.unwrap();
    network.shutdown();
}

#[tokio::test]
async fn test_epoch_strategy_updates_status_list_once() {
    let network = TestNetwork::start(RevocationStrategy::Epoch).await;
    let plan = LifecyclePlan::faber_college(3, 10);

    let summary = run_lifecycle(&network.config, &network.issuer, &network.holder, &plan)
        .await
        .unwrap();

    assert_eq!(summary.report.revoked_indexes(), BTreeSet::from([1, 2, 3]));
    assert_eq!(summary.report.notifications().len(), 3);
    assert_eq!(summary.holder_notifications.len(), 3);
    let status_list = network
        .ledger
        .get_revocation_status_list(&summary.revocation_artifacts.rev_reg_def_id)
        .await
        .unwrap();
    assert_eq!(status_list.version, 2);
    network.shutdown();
}

#[tokio::test]
async fn test_unknown_credential_does_not_stop_revocation() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(2, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let listener = network.start_holder_listener();
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();
    let ids = IssuanceCoordinator::new(network.config.issuance_timeout())
        .issue_batch(
            &network.issuer,
            &pair.issuer_connection_id,
            &credential.cred_def_id,
            &revocation.rev_reg_def_id,
            &plan.attribute_sets,
        )
        .await
        .unwrap();

    let batch = vec![ids[0].clone(), "no-such-credential".to_string(), ids[1].clone()];
    let report = RevocationCoordinator::new(RevocationStrategy::PerCredential)
        .revoke_batch(&network.issuer, &batch)
        .await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.revoked_indexes(), BTreeSet::from([1, 2]));
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].credential_id, "no-such-credential");
    assert_eq!(
        failures[0].error.as_ref().unwrap().kind(),
        AgentErrorKind::NotFound
    );
    assert!(!report.is_complete());

    let again = RevocationCoordinator::new(RevocationStrategy::PerCredential)
        .revoke_batch(&network.issuer, &ids[..1])
        .await;
    assert_eq!(again.revoked_indexes(), BTreeSet::from([1]));
    let status_list = network
        .ledger
        .get_revocation_status_list(&revocation.rev_reg_def_id)
        .await
        .unwrap();
    assert_eq!(status_list.revoked_indexes, BTreeSet::from([1, 2]));
    assert_eq!(status_list.version, 3);

    listener.stop().await.unwrap();
    network.shutdown();
}

#[tokio::test]
async fn test_offer_without_connection_is_rejected() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(1, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;

    let err = network
        .issuer
        .issuer()
        .offer_credential(
            "no-such-connection",
            OfferInfo::new(&credential.cred_def_id, &revocation.rev_reg_def_id, BTreeMap::new()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::NotFound);
    assert!(network
        .issuer
        .rev_regs()
        .allocated_indexes(&revocation.rev_reg_def_id)
        .unwrap()
        .is_empty());
    network.shutdown();
}

#[tokio::test]
async fn test_undelivered_offer_leaves_no_record_behind() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(1, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();
    network.holder.shutdown();

    let issuer = network.issuer.issuer();
    for _ in 0..2 {
        let err = issuer
            .offer_credential(
                &pair.issuer_connection_id,
                OfferInfo::new(
                    &credential.cred_def_id,
                    &revocation.rev_reg_def_id,
                    plan.attribute_sets[0].clone(),
                ),
            )
            .unwrap_err();
        assert_eq!(err.kind(), AgentErrorKind::TransportError);
    }

    assert!(issuer.credential_ids().unwrap().is_empty());
    assert!(network
        .issuer
        .rev_regs()
        .allocated_indexes(&revocation.rev_reg_def_id)
        .unwrap()
        .is_empty());
    network.shutdown();
}

#[tokio::test]
async fn test_undelivered_request_keeps_offer_open() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(1, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();

    let mut holder_events = network.holder.events().subscribe();
    network
        .issuer
        .issuer()
        .offer_credential(
            &pair.issuer_connection_id,
            OfferInfo::new(
                &credential.cred_def_id,
                &revocation.rev_reg_def_id,
                plan.attribute_sets[0].clone(),
            ),
        )
        .unwrap();
    let credential_id = await_event(
        &mut holder_events,
        Duration::from_secs(2),
        "credential offer",
        |event| match event {
            AgentEvent::CredentialStateChanged(record)
                if record.state == CredentialState::OfferReceived =>
            {
                Some(record.id.clone())
            }
            _ => None,
        },
    )
    .await
    .unwrap();
    network.issuer.shutdown();

    let holder = network.holder.holder();
    let err = holder.accept_offer(&credential_id).unwrap_err();
    assert_eq!(err.kind(), AgentErrorKind::TransportError);
    assert_eq!(
        holder.get_state(&credential_id).unwrap(),
        CredentialState::OfferReceived
    );
    network.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_revocations_of_one_registry() {
    let network = TestNetwork::start(RevocationStrategy::PerCredential).await;
    let plan = LifecyclePlan::faber_college(5, 10);
    let (credential, revocation) = network.register(&plan.schema, plan.capacity).await;
    let listener = network.start_holder_listener();
    let pair = ConnectionBroker::new(network.config.connection_timeout())
        .establish(&network.issuer, &network.holder)
        .await
        .unwrap();
    let ids = IssuanceCoordinator::new(network.config.issuance_timeout())
        .issue_batch(
            &network.issuer,
            &pair.issuer_connection_id,
            &credential.cred_def_id,
            &revocation.rev_reg_def_id,
            &plan.attribute_sets,
        )
        .await
        .unwrap();

    // index 3 is in both batches
    let batches = [ids[..3].to_vec(), ids[2..].to_vec()];
    let tasks: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let issuer = network.issuer.clone();
            tokio::spawn(async move {
                RevocationCoordinator::new(RevocationStrategy::PerCredential)
                    .revoke_batch(&issuer, &batch)
                    .await
            })
        })
        .collect();
    let mut revoked = BTreeSet::new();
    for task in tasks {
        let report = task.await.unwrap();
        assert_eq!(report.failures().count(), 0);
        revoked.extend(report.revoked_indexes());
    }

    assert_eq!(revoked, BTreeSet::from([1, 2, 3, 4, 5]));
    let status_list = network
        .ledger
        .get_revocation_status_list(&revocation.rev_reg_def_id)
        .await
        .unwrap();
    assert_eq!(status_list.revoked_indexes, BTreeSet::from([1, 2, 3, 4, 5]));
    assert_eq!(status_list.version, 6);

    listener.stop().await.unwrap();
    network.shutdown();
}
