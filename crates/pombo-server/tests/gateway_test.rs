//! End-to-end gateway behavior over the core services: registration,
//! targeted delivery, group broadcast, disconnect semantics, and
//! heartbeat-driven eviction.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pombo_api::MessageFrame;
use pombo_common::PomboError;
use pombo_core::{HeartbeatConfig, HeartbeatMonitor};

use common::{connect_client, standalone_gateway, wait_until};

#[tokio::test]
async fn test_full_gateway_scenario() {
    let gateway = standalone_gateway();

    // Register sys1, then reject the duplicate before any state changes
    gateway.account.register("sys1").await.unwrap();
    let err = gateway.account.register("sys1").await.unwrap_err();
    assert!(matches!(err, PomboError::SystemAlreadyRegistered(_)));

    // Two local connections
    let (client_a, socket_a) = connect_client(&gateway, "sys1");
    let (client_b, socket_b) = connect_client(&gateway, "sys1");

    // Targeted send reaches only A, exactly once
    let message_id = gateway
        .router
        .send_to_client(&client_a, "caller", 200, "hello", None)
        .await
        .unwrap();
    assert!(!message_id.is_empty());
    assert!(wait_until(|| socket_a.sent_frames().len() == 1, Duration::from_secs(1)).await);
    assert!(socket_b.sent_frames().is_empty());

    let frame: MessageFrame = serde_json::from_str(&socket_a.sent_frames()[0]).unwrap();
    assert_eq!(frame.message_id, message_id);
    assert_eq!(frame.msg, "hello");

    // Bind both to (sys1, g1); the group send reaches each exactly once
    gateway
        .router
        .bind_to_group("sys1", "g1", &client_a, "userA", "")
        .await
        .unwrap();
    gateway
        .router
        .bind_to_group("sys1", "g1", &client_b, "userB", "")
        .await
        .unwrap();

    gateway
        .router
        .send_to_group("sys1", "g1", "caller", 200, "hi group", None)
        .await
        .unwrap();
    assert!(wait_until(|| socket_a.sent_frames().len() == 2, Duration::from_secs(1)).await);
    assert!(wait_until(|| socket_b.sent_frames().len() == 1, Duration::from_secs(1)).await);

    let online = gateway.router.online_list("sys1", "g1").await;
    assert_eq!(online.count, 2);

    // Disconnect A: a later send still returns a tracking id but delivers
    // nothing (best-effort)
    gateway.router.close_client(&client_a, "sys1").await.unwrap();
    assert!(
        wait_until(
            || gateway.manager.get_by_client_id(&client_a).is_none(),
            Duration::from_secs(1)
        )
        .await
    );
    assert!(gateway.manager.local_group_clients("sys1", "g1").len() == 1);

    let late_id = gateway
        .router
        .send_to_client(&client_a, "caller", 200, "too late", None)
        .await
        .unwrap();
    assert!(!late_id.is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(socket_a.sent_frames().len(), 2);
}

#[tokio::test]
async fn test_heartbeat_failure_cleans_up_group_membership() {
    let gateway = standalone_gateway();
    gateway.account.register("sys1").await.unwrap();

    let (client_b, socket_b) = connect_client(&gateway, "sys1");
    gateway
        .router
        .bind_to_group("sys1", "g1", &client_b, "userB", "")
        .await
        .unwrap();

    // B stops answering probes
    socket_b.fail_ping.store(true, Ordering::SeqCst);

    let monitor = HeartbeatMonitor::new(
        gateway.manager.clone(),
        HeartbeatConfig {
            interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(10),
        },
    );
    monitor.start().await;

    assert!(
        wait_until(
            || gateway.manager.get_by_client_id(&client_b).is_none(),
            Duration::from_secs(2)
        )
        .await
    );
    assert!(gateway.manager.local_group_clients("sys1", "g1").is_empty());
    assert!(socket_b.closed.load(Ordering::SeqCst));

    monitor.stop().await;
}

#[tokio::test]
async fn test_messages_to_one_connection_stay_ordered() {
    let gateway = standalone_gateway();
    let (client_id, socket) = connect_client(&gateway, "sys1");

    for n in 0..50 {
        gateway
            .router
            .send_to_client(&client_id, "caller", 200, &format!("m{}", n), None)
            .await
            .unwrap();
    }

    assert!(wait_until(|| socket.sent_frames().len() == 50, Duration::from_secs(2)).await);
    for (n, raw) in socket.sent_frames().iter().enumerate() {
        let frame: MessageFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.msg, format!("m{}", n));
    }
}

#[tokio::test]
async fn test_send_to_clients_batch() {
    let gateway = standalone_gateway();
    let (client_a, socket_a) = connect_client(&gateway, "sys1");
    let (client_b, socket_b) = connect_client(&gateway, "sys1");

    let ids = vec![client_a, client_b];
    let message_id = gateway
        .router
        .send_to_clients(&ids, "caller", 200, "fanout", None)
        .await
        .unwrap();

    assert!(wait_until(|| socket_a.sent_frames().len() == 1, Duration::from_secs(1)).await);
    assert!(wait_until(|| socket_b.sent_frames().len() == 1, Duration::from_secs(1)).await);

    // One message id across the whole batch
    let frame_a: MessageFrame = serde_json::from_str(&socket_a.sent_frames()[0]).unwrap();
    let frame_b: MessageFrame = serde_json::from_str(&socket_b.sent_frames()[0]).unwrap();
    assert_eq!(frame_a.message_id, message_id);
    assert_eq!(frame_b.message_id, message_id);
}

#[tokio::test]
async fn test_system_broadcast_reaches_all_connections_of_system() {
    let gateway = standalone_gateway();
    let (_, socket_a) = connect_client(&gateway, "sys1");
    let (_, socket_b) = connect_client(&gateway, "sys1");
    let (_, socket_other) = connect_client(&gateway, "sys2");

    gateway
        .router
        .send_to_system("sys1", "caller", 200, "to everyone", None)
        .await
        .unwrap();

    assert!(wait_until(|| socket_a.sent_frames().len() == 1, Duration::from_secs(1)).await);
    assert!(wait_until(|| socket_b.sent_frames().len() == 1, Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(socket_other.sent_frames().is_empty());
}
