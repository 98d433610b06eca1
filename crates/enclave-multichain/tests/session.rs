//! Connecting, routing and closing sessions.

use enclave_core::{JsonRpcRequest, PluginId};
use enclave_multichain::collaborator::wallet_snap_plugins;
use enclave_multichain::keyring::{HANDLE_DISCONNECT, HANDLE_REQUEST};
use enclave_multichain::{MultichainError, NegotiatorOptions, WALLET_SNAP};
use enclave_test::{TestHost, chain, keyring_declaration, namespace, origin, request_namespaces, test_origin};
use serde_json::json;

const SEND: &str = "eth_sendTransaction";

/// A host with one approved EVM keyring on mainnet and Sepolia.
async fn host_with_wallet() -> (TestHost, PluginId) {
    let host = TestHost::new();
    let wallet = host
        .install_keyring(
            "npm:wallet",
            keyring_declaration(&[("eip155", &["eip155:1", "eip155:11155111"])]),
            &["eip155:1:0xabc", "eip155:11155111:0xdef"],
        )
        .await
        .unwrap();
    host.permissions.add_access(&test_origin(), &wallet);
    (host, wallet)
}

async fn connect_mainnet(host: &TestHost) {
    host.negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &["eip155:1"], &[SEND])]),
        )
        .await
        .unwrap();
}

fn send() -> JsonRpcRequest {
    JsonRpcRequest::new(1_i64, SEND, Some(json!([{"to": "0x1"}])))
}

#[tokio::test]
async fn test_connect_binds_approved_plugin() {
    let (host, wallet) = host_with_wallet().await;

    let provided = host
        .negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &["eip155:1"], &[SEND])]),
        )
        .await
        .unwrap();

    let eip155 = &provided[&namespace("eip155")];
    assert_eq!(eip155.chains, vec![chain("eip155:1")]);
    assert_eq!(eip155.methods, vec![SEND.to_string()]);
    // Accounts on chains the origin did not ask for are filtered out.
    assert_eq!(eip155.accounts.len(), 1);
    assert_eq!(eip155.accounts[0].as_str(), "eip155:1:0xabc");

    assert!(host.permissions.approval_requests().is_empty());
    assert_eq!(host.supervisor.active_references(&wallet), 1);

    let session = host.negotiator.get_session(&test_origin()).await.unwrap();
    assert_eq!(session.handling_plugins[&namespace("eip155")], wallet);
    assert_eq!(session.provided_namespaces, provided);
}

#[tokio::test]
async fn test_connect_records_wallet_snap_grant() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    let grants = host.permissions.grants();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].subject, test_origin());
    assert!(grants[0].preserve_existing);
    assert_eq!(
        wallet_snap_plugins(&grants[0].approved_permissions[WALLET_SNAP]),
        vec![wallet]
    );
}

#[tokio::test]
async fn test_request_is_forwarded() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    let answer = host
        .negotiator
        .request(&test_origin(), &chain("eip155:1"), send())
        .await
        .unwrap();
    assert_eq!(answer, json!({"chainId": "eip155:1", "method": SEND}));

    let forwarded = host.backend.calls_to(&wallet, HANDLE_REQUEST);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].handler, "onKeyringRequest");
    assert_eq!(forwarded[0].params["request"]["params"], json!([{"to": "0x1"}]));
}

#[tokio::test]
async fn test_unrequested_chain_never_reaches_plugin() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    // Declared by the plugin, but not part of the session.
    let err = host
        .negotiator
        .request(&test_origin(), &chain("eip155:11155111"), send())
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::UnsupportedChain(c) if c == chain("eip155:11155111")));

    let err = host
        .negotiator
        .request(&test_origin(), &chain("eip155:999"), send())
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::UnsupportedChain(_)));

    let err = host
        .negotiator
        .request(&test_origin(), &chain("cosmos:cosmoshub-4"), send())
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::UnsupportedChain(_)));

    assert!(host.backend.calls_to(&wallet, HANDLE_REQUEST).is_empty());
}

#[tokio::test]
async fn test_unrequested_method_is_rejected() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    let err = host
        .negotiator
        .request(
            &test_origin(),
            &chain("eip155:1"),
            JsonRpcRequest::new(2_i64, "eth_sign", None),
        )
        .await
        .unwrap_err();
    match err {
        MultichainError::UnsupportedMethod { namespace: ns, method } => {
            assert_eq!(ns, namespace("eip155"));
            assert_eq!(method, "eth_sign");
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.backend.calls_to(&wallet, HANDLE_REQUEST).is_empty());
}

#[tokio::test]
async fn test_request_without_session() {
    let (host, _) = host_with_wallet().await;
    connect_mainnet(&host).await;

    let stranger = origin("https://other.example");
    let err = host
        .negotiator
        .request(&stranger, &chain("eip155:1"), send())
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::NoSession(o) if o == stranger));
    // Looking up an unknown origin leaves nothing behind.
    assert_eq!(host.negotiator.store().len().await, 1);
}

#[tokio::test]
async fn test_revoked_permission_blocks_requests() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;
    host.permissions.revoke(&test_origin(), &wallet);

    let err = host
        .negotiator
        .request(&test_origin(), &chain("eip155:1"), send())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MultichainError::PermissionRevoked { ref plugin_id, .. } if *plugin_id == wallet
    ));
    assert!(host.backend.calls_to(&wallet, HANDLE_REQUEST).is_empty());
}

#[tokio::test]
async fn test_plugin_error_is_returned() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;
    host.backend.set_handler(wallet, |_| {
        Err(enclave_core::JsonRpcError::new(4001, "User rejected the request."))
    });

    let err = host
        .negotiator
        .request(&test_origin(), &chain("eip155:1"), send())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MultichainError::Execution(enclave_executor::ExecutorError::Plugin(ref e)) if e.code == 4001
    ));
}

#[tokio::test]
async fn test_close_session() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    host.negotiator.close_session(&test_origin()).await.unwrap();

    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert!(host.negotiator.store().is_empty().await);
    assert_eq!(host.supervisor.active_references(&wallet), 0);
    assert!(matches!(
        host.negotiator.request(&test_origin(), &chain("eip155:1"), send()).await,
        Err(MultichainError::NoSession(_))
    ));
    assert!(matches!(
        host.negotiator.close_session(&test_origin()).await,
        Err(MultichainError::NoSession(_))
    ));

    let notified = host.backend.wait_for_call(&wallet, HANDLE_DISCONNECT).await.unwrap();
    assert_eq!(notified.params, json!({"origin": "https://dapp.example"}));
    assert_eq!(notified.origin, "https://dapp.example");
}

#[tokio::test]
async fn test_close_without_notification() {
    let (host, wallet) = host_with_wallet().await;
    let negotiator = host.negotiator.clone().with_options(NegotiatorOptions {
        notify_on_close: false,
        ..NegotiatorOptions::default()
    });
    negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &["eip155:1"], &[SEND])]),
        )
        .await
        .unwrap();

    negotiator.close_session(&test_origin()).await.unwrap();
    assert_eq!(host.supervisor.active_references(&wallet), 0);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(host.backend.calls_to(&wallet, HANDLE_DISCONNECT).is_empty());
}

#[tokio::test]
async fn test_references_track_sessions() {
    let (host, wallet) = host_with_wallet().await;
    let second = origin("https://second.example");
    host.permissions.add_access(&second, &wallet);

    connect_mainnet(&host).await;
    assert_eq!(host.supervisor.active_references(&wallet), 1);

    // Reconnecting replaces the session instead of stacking references.
    connect_mainnet(&host).await;
    assert_eq!(host.supervisor.active_references(&wallet), 1);
    assert_eq!(host.negotiator.store().len().await, 1);

    host.negotiator
        .connect(&second, request_namespaces(&[("eip155", &["eip155:1"], &[])]))
        .await
        .unwrap();
    assert_eq!(host.supervisor.active_references(&wallet), 2);

    host.negotiator.close_session(&test_origin()).await.unwrap();
    assert_eq!(host.supervisor.active_references(&wallet), 1);
    host.negotiator.close_session(&second).await.unwrap();
    assert_eq!(host.supervisor.active_references(&wallet), 0);
}

#[tokio::test]
async fn test_concurrent_connects_from_one_origin() {
    let (host, wallet) = host_with_wallet().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let negotiator = host.negotiator.clone();
        tasks.push(tokio::spawn(async move {
            negotiator
                .connect(
                    &test_origin(),
                    request_namespaces(&[("eip155", &["eip155:1"], &[SEND])]),
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(host.supervisor.active_references(&wallet), 1);
    assert_eq!(host.negotiator.store().len().await, 1);
}

#[tokio::test]
async fn test_session_events() {
    let (host, wallet) = host_with_wallet().await;
    let mut events = host.supervisor.events().subscribe();

    connect_mainnet(&host).await;
    host.negotiator.close_session(&test_origin()).await.unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.event_type(), "session_created");
    match created.as_ref() {
        enclave_events::EnclaveEvent::SessionCreated { origin, plugins, .. } => {
            assert_eq!(*origin, test_origin());
            assert_eq!(*plugins, vec![wallet]);
        },
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.recv().await.unwrap().event_type(), "session_closed");
}

#[tokio::test]
async fn test_no_accounts_is_no_match() {
    let host = TestHost::new();
    let empty = host
        .install_keyring(
            "npm:empty",
            keyring_declaration(&[("eip155", &["eip155:1"])]),
            &[],
        )
        .await
        .unwrap();
    host.permissions.add_access(&test_origin(), &empty);

    let err = host
        .negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &["eip155:1"], &[])]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::NoMatch));
    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert!(host.negotiator.store().is_empty().await);
    assert_eq!(host.supervisor.active_references(&empty), 0);
    assert!(host.permissions.grants().is_empty());
}

#[tokio::test]
async fn test_accounts_on_other_chains_are_no_match() {
    let host = TestHost::new();
    let wallet = host
        .install_keyring(
            "npm:wallet",
            keyring_declaration(&[("eip155", &["eip155:1", "eip155:10"])]),
            &["eip155:10:0xabc"],
        )
        .await
        .unwrap();
    host.permissions.add_access(&test_origin(), &wallet);

    let err = host
        .negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &["eip155:1"], &[])]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::NoMatch));
}

#[tokio::test]
async fn test_unusable_plugins_are_skipped() {
    let (host, wallet) = host_with_wallet().await;
    let request = || request_namespaces(&[("eip155", &["eip155:1"], &[])]);

    host.directory.disable(&wallet);
    assert!(matches!(
        host.negotiator.connect(&test_origin(), request()).await,
        Err(MultichainError::NoMatch)
    ));

    let (host, wallet) = host_with_wallet().await;
    host.directory.block(&wallet);
    assert!(matches!(
        host.negotiator.connect(&test_origin(), request()).await,
        Err(MultichainError::NoMatch)
    ));

    let (host, wallet) = host_with_wallet().await;
    host.supervisor.terminate_plugin(&wallet).unwrap();
    assert!(matches!(
        host.negotiator.connect(&test_origin(), request()).await,
        Err(MultichainError::NoMatch)
    ));
}

#[tokio::test]
async fn test_failed_reconnect_closes_previous_session() {
    let (host, wallet) = host_with_wallet().await;
    connect_mainnet(&host).await;

    let err = host
        .negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("cosmos", &["cosmos:cosmoshub-4"], &[])]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MultichainError::NoMatch));
    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert_eq!(host.supervisor.active_references(&wallet), 0);
}
