//! Lifecycle tests for `ConnectionManager` over a scripted transport.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use log::Level;
use netview::{
    Client,
    ClientConfig,
    ClientError,
    ConnectionManager,
    ConnectionState,
    InboundMessage,
    ServerEndpoint,
};
use netview_testing::{LoggerHandle, OpenOutcome, ScriptedTransport, logger, wait_for_state};
use rstest::rstest;
use serde_json::json;
use tokio::{sync::mpsc, time::sleep};

fn endpoint() -> ServerEndpoint { ServerEndpoint::new("monitor.local", 9100) }

fn manager_over(transport: &ScriptedTransport) -> ConnectionManager {
    ConnectionManager::new(ClientConfig::default(), Arc::new(transport.clone()))
}

fn gaps(transport: &ScriptedTransport) -> Vec<Duration> {
    transport
        .open_times()
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect()
}

fn record_connectivity(manager: &ConnectionManager) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = manager.on_connection_change(move |connected| {
        sink.lock().expect("lock").push(*connected);
    });
    seen
}

#[tokio::test(start_paused = true)]
async fn connect_opens_transport_and_notifies() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);
    let seen = record_connectivity(&manager);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect(endpoint());
    assert_eq!(manager.state(), ConnectionState::Connecting);
    let peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    assert_eq!(peer.endpoint(), &endpoint());
    assert_eq!(manager.endpoint(), Some(endpoint()));
    assert_eq!(*seen.lock().expect("lock"), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn connect_while_connected_is_a_no_op() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    let _peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    manager.connect(endpoint());
    manager.connect(ServerEndpoint::new("elsewhere", 1));
    sleep(Duration::from_secs(30)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.endpoint(), Some(endpoint()));
}

#[tokio::test(start_paused = true)]
async fn refused_connections_back_off_then_give_up() {
    let transport = ScriptedTransport::refusing();
    let manager = manager_over(&transport);
    let seen = record_connectivity(&manager);

    manager.connect(endpoint());
    wait_for_state(&manager, ConnectionState::Disconnected).await;

    assert_eq!(transport.open_count(), 6);
    assert_eq!(
        gaps(&transport),
        [1, 2, 4, 8, 10].map(Duration::from_secs).to_vec()
    );
    assert!(seen.lock().expect("lock").is_empty());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_after_giving_up_restores_the_budget() {
    let transport = ScriptedTransport::refusing();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    manager.connect(endpoint());
    wait_for_state(&manager, ConnectionState::Disconnected).await;

    assert_eq!(transport.open_count(), 12);
}

#[tokio::test(start_paused = true)]
async fn connect_while_reconnecting_retries_immediately() {
    let transport = ScriptedTransport::refusing();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    wait_for_state(&manager, ConnectionState::Reconnecting).await;
    transport.set_fallback(OpenOutcome::Accept);
    manager.connect(endpoint());
    let _peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    assert_eq!(gaps(&transport), vec![Duration::ZERO]);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_rejects_outstanding_requests() {
    let transport = ScriptedTransport::accepting();
    let client = Client::new(ClientConfig::default(), Arc::new(transport.clone()));
    let seen = record_connectivity(client.manager());

    client.connect(endpoint());
    let mut peer = transport.next_peer().await;
    wait_for_state(client.manager(), ConnectionState::Connected).await;

    let requests: Vec<_> = (0..3)
        .map(|device| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .send_request("get_ports", json!({ "device": device }))
                    .await
            })
        })
        .collect();
    for _ in 0..3 {
        let _ = peer.recv_request().await;
    }
    assert_eq!(client.manager().pending_count(), 3);

    peer.close();
    for request in requests {
        let result = request.await.expect("request task");
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
    assert_eq!(client.manager().pending_count(), 0);
    assert_eq!(*seen.lock().expect("lock"), vec![true, false]);
    assert_eq!(client.state(), ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_the_attempt_counter() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    transport.next_peer().await.close();
    transport.next_peer().await.close();
    let _peer = transport.next_peer().await;

    assert_eq!(gaps(&transport), vec![Duration::from_secs(1); 2]);
}

#[tokio::test(start_paused = true)]
async fn failed_retries_count_towards_the_budget_until_one_succeeds() {
    let transport = ScriptedTransport::accepting().then([
        OpenOutcome::Accept,
        OpenOutcome::Refuse,
        OpenOutcome::Refuse,
    ]);
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    transport.next_peer().await.close();
    let _peer = transport.next_peer().await;

    assert_eq!(
        gaps(&transport),
        [1, 2, 4].map(Duration::from_secs).to_vec()
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_and_suppresses_reconnect() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);
    let seen = record_connectivity(&manager);

    manager.connect(endpoint());
    let mut peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    manager.disconnect();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(peer.client_closed().await);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(*seen.lock().expect("lock"), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_scheduled_retry() {
    let transport = ScriptedTransport::refusing();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    wait_for_state(&manager, ConnectionState::Reconnecting).await;
    manager.disconnect();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn send_requires_an_open_connection() {
    let transport = ScriptedTransport::refusing();
    let manager = manager_over(&transport);

    assert!(matches!(
        manager.send("{}".to_owned()),
        Err(ClientError::NotConnected)
    ));
    manager.connect(endpoint());
    assert!(matches!(
        manager.send("{}".to_owned()),
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn unmatched_messages_reach_observers_only() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
    let _subscription = manager.on_message(move |message| {
        let _ = tx.send(message.clone());
    });

    manager.connect(endpoint());
    let peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    peer.send_json(&json!({"event": "link_down", "port": 4}));
    peer.reply("nobody-asked", json!({"success": true}));

    let pushed = rx.recv().await.expect("pushed message");
    assert!(pushed.request_id().is_none());
    assert_eq!(pushed.get("event"), Some(&json!("link_down")));
    let stray = rx.recv().await.expect("stray response");
    assert_eq!(stray.request_id().map(|id| id.as_str()), Some("nobody-asked"));
    assert_eq!(manager.pending_count(), 0);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn malformed_frames_are_logged_and_skipped(mut logger: LoggerHandle) {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
    let _subscription = manager.on_message(move |message| {
        let _ = tx.send(message.clone());
    });

    manager.connect(endpoint());
    let peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    peer.send_text("{not json");
    peer.send_text("[1, 2, 3]");
    peer.send_json(&json!({"event": "heartbeat"}));

    let delivered = rx.recv().await.expect("valid message");
    assert_eq!(delivered.get("event"), Some(&json!("heartbeat")));
    assert!(rx.try_recv().is_err());
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(logger.saw(Level::Warn, "malformed frame"));
}

#[tokio::test(start_paused = true)]
async fn transport_errors_close_the_connection() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);

    manager.connect(endpoint());
    let peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    peer.send_error(std::io::ErrorKind::ConnectionReset);
    wait_for_state(&manager, ConnectionState::Reconnecting).await;

    let _next = transport.next_peer().await;
    assert_eq!(gaps(&transport), vec![Duration::from_secs(1)]);
}

#[tokio::test(start_paused = true)]
async fn panicking_observer_does_not_stop_delivery() {
    let transport = ScriptedTransport::accepting();
    let manager = manager_over(&transport);
    let _faulty = manager.on_connection_change(|_| panic!("observer failure"));
    let seen = record_connectivity(&manager);

    manager.connect(endpoint());
    let _peer = transport.next_peer().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    assert_eq!(*seen.lock().expect("lock"), vec![true]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconnect_racing_a_close_keeps_new_requests() {
    for _ in 0..20 {
        let transport = ScriptedTransport::accepting();
        let client = Client::new(ClientConfig::default(), Arc::new(transport.clone()));
        client.connect(endpoint());
        let old = transport.next_peer().await;
        wait_for_state(client.manager(), ConnectionState::Connected).await;

        let reconnect = tokio::spawn({
            let client = client.clone();
            async move {
                while client.state().is_connected() {
                    tokio::task::yield_now().await;
                }
                client.connect(endpoint());
            }
        });
        old.close();
        reconnect.await.expect("reconnect task");

        let mut peer = transport.next_peer().await;
        wait_for_state(client.manager(), ConnectionState::Connected).await;
        let request = tokio::spawn({
            let client = client.clone();
            async move { client.send_request("ping", json!({})).await }
        });
        let (id, _) = peer.recv_request().await;
        peer.reply(&id, json!({"success": true, "data": "pong"}));

        let response = request.await.expect("task").expect("response on new session");
        assert_eq!(response.data(), Some(&json!("pong")));
        client.shutdown();
    }
}
