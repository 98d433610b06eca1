//! Session cleanup when a bound plugin's runtime dies.

use std::time::Duration;

use enclave_core::PluginId;
use enclave_multichain::keyring::HANDLE_DISCONNECT;
use enclave_test::{TestHost, keyring_declaration, origin, request_namespaces, test_origin};

const MAINNET: &str = "eip155:1";
const SOLANA: &str = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
const SOLANA_ACCOUNT: &str =
    "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp:7S3P4HxJpyyigGzodYwHtCxZyUQe9JiBMHyRWXArAaKv";

/// An EVM and a Solana keyring, both approved for the test origin.
async fn two_keyrings() -> (TestHost, PluginId, PluginId) {
    let host = TestHost::new();
    let evm = host
        .install_keyring("npm:evm", keyring_declaration(&[("eip155", &[MAINNET])]), &["eip155:1:0xabc"])
        .await
        .unwrap();
    let sol = host
        .install_keyring("npm:solana", keyring_declaration(&[("solana", &[SOLANA])]), &[SOLANA_ACCOUNT])
        .await
        .unwrap();
    host.permissions.add_access(&test_origin(), &evm);
    host.permissions.add_access(&test_origin(), &sol);
    (host, evm, sol)
}

async fn connect_both(host: &TestHost) {
    host.negotiator
        .connect(
            &test_origin(),
            request_namespaces(&[("eip155", &[MAINNET], &[]), ("solana", &[SOLANA], &[])]),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_crash_closes_bound_sessions() {
    let (host, evm, sol) = two_keyrings().await;
    connect_both(&host).await;

    host.supervisor.terminate_plugin(&evm).unwrap();
    let closed = host.negotiator.handle_plugin_crashed(&evm).await;

    assert_eq!(closed, 1);
    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert!(host.negotiator.store().is_empty().await);
    assert_eq!(host.supervisor.active_references(&sol), 0);

    // The surviving plugin hears about the disconnect, the dead one does not.
    assert!(host.backend.wait_for_call(&sol, HANDLE_DISCONNECT).await.is_some());
    assert!(host.backend.calls_to(&evm, HANDLE_DISCONNECT).is_empty());
}

#[tokio::test]
async fn test_crash_leaves_unrelated_sessions() {
    let (host, evm, sol) = two_keyrings().await;
    let other = origin("https://solana-only.example");
    host.permissions.add_access(&other, &sol);

    connect_both(&host).await;
    host.negotiator
        .connect(&other, request_namespaces(&[("solana", &[SOLANA], &[])]))
        .await
        .unwrap();
    assert_eq!(host.supervisor.active_references(&sol), 2);

    assert_eq!(host.negotiator.handle_plugin_crashed(&evm).await, 1);

    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert!(host.negotiator.get_session(&other).await.is_some());
    assert_eq!(host.supervisor.active_references(&sol), 1);
}

#[tokio::test]
async fn test_crash_of_unbound_plugin_is_a_noop() {
    let (host, evm, sol) = two_keyrings().await;
    host.negotiator
        .connect(&test_origin(), request_namespaces(&[("solana", &[SOLANA], &[])]))
        .await
        .unwrap();

    assert_eq!(host.negotiator.handle_plugin_crashed(&evm).await, 0);
    assert!(host.negotiator.get_session(&test_origin()).await.is_some());
    assert_eq!(host.supervisor.active_references(&sol), 1);
}

#[tokio::test]
async fn test_listener_reacts_to_runtime_crash() {
    let (host, evm, sol) = two_keyrings().await;
    let listener = host
        .negotiator
        .spawn_crash_listener(host.supervisor.events().subscribe());
    connect_both(&host).await;

    assert!(host.backend.crash(&evm));

    let mut cleaned = false;
    for _ in 0..100 {
        if host.negotiator.get_session(&test_origin()).await.is_none() {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleaned, "session survived the crash");
    assert_eq!(host.supervisor.active_references(&sol), 0);
    assert!(!host.supervisor.is_running(&evm));

    listener.abort();
}

#[tokio::test]
async fn test_reconnect_after_crash_and_restart() {
    let (host, evm, _sol) = two_keyrings().await;
    connect_both(&host).await;

    assert!(host.backend.crash(&evm));
    for _ in 0..100 {
        if !host.supervisor.is_running(&evm) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    host.negotiator.handle_plugin_crashed(&evm).await;

    host.supervisor.execute_plugin(&evm, "/* keyring */", &[]).await.unwrap();
    host.negotiator
        .connect(&test_origin(), request_namespaces(&[("eip155", &[MAINNET], &[])]))
        .await
        .unwrap();
    assert_eq!(host.supervisor.active_references(&evm), 1);
}

#[tokio::test]
async fn test_crash_cleanup_not_blocked_by_pending_approval() {
    let (host, evm, _sol) = two_keyrings().await;
    connect_both(&host).await;

    // Another origin is stuck waiting on a human that never answers.
    let waiting = origin("https://waiting.example");
    host.permissions.queue_unanswered();
    let parked = {
        let negotiator = host.negotiator.clone();
        let waiting = waiting.clone();
        tokio::spawn(async move {
            negotiator
                .connect(&waiting, request_namespaces(&[("eip155", &[MAINNET], &[])]))
                .await
        })
    };
    for _ in 0..100 {
        if !host.permissions.approval_requests().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(host.permissions.approval_requests().len(), 1);

    host.supervisor.terminate_plugin(&evm).unwrap();
    let closed = tokio::time::timeout(
        Duration::from_secs(1),
        host.negotiator.handle_plugin_crashed(&evm),
    )
    .await
    .expect("crash cleanup stalled behind another origin");

    assert_eq!(closed, 1);
    assert!(host.negotiator.get_session(&test_origin()).await.is_none());
    assert!(!parked.is_finished());
    parked.abort();
}
