//! End-to-end tests against a real listener, HTTP client and WebSocket viewer.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use scoreboard_core::Snapshot;
use scoreboard_server::config::ServerConfig;
use scoreboard_server::server::ScoreServer;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server on an ephemeral port.
async fn boot_server_with(config: ServerConfig) -> (SocketAddr, ScoreServer) {
    let server = ScoreServer::new(config, scoreboard_server::metrics::detached_handle());
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn boot_server() -> (SocketAddr, ScoreServer) {
    boot_server_with(ServerConfig::default()).await
}

async fn http_snapshot(addr: SocketAddr, path: &str) -> Snapshot {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json::<Snapshot>()
        .await
        .unwrap()
}

async fn connect_viewer(addr: SocketAddr, id: &str) -> WsStream {
    let (ws, _resp) = connect_async(format!("ws://{addr}/websocket?id={id}"))
        .await
        .unwrap();
    ws
}

/// Next pushed snapshot, skipping control frames.
async fn next_snapshot(ws: &mut WsStream) -> Snapshot {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for snapshot")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(frame) => panic!("viewer closed: {frame:?}"),
            _ => {}
        }
    }
}

/// Read snapshots until one satisfies `pred`.
async fn wait_for(ws: &mut WsStream, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
    loop {
        let snap = next_snapshot(ws).await;
        if pred(&snap) {
            return snap;
        }
    }
}

/// Wait until the server closes the viewer.
async fn expect_closed(ws: &mut WsStream) {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("timed out waiting for close") {
            None | Some(Err(_) | Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

async fn eventually(check: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn create_connect_increment_scenario() {
    let (addr, _server) = boot_server().await;

    let created = http_snapshot(addr, "/add_participant").await;
    assert_eq!(created.points, vec![0]);
    let id = created.id;

    let mut viewer = connect_viewer(addr, &id).await;
    let first = next_snapshot(&mut viewer).await;
    assert_eq!(first, Snapshot { id: id.clone(), points: vec![0] });

    let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
    let resp = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
    assert_eq!(resp, Snapshot { id: id.clone(), points: vec![2] });

    let last = wait_for(&mut viewer, |s| s.points == vec![2]).await;
    assert_eq!(last.id, id);
}

#[tokio::test]
async fn viewers_see_monotonic_scores() {
    let (addr, _server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;

    for _ in 0..20 {
        let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
    }

    let mut last = 0;
    loop {
        let snap = next_snapshot(&mut viewer).await;
        assert!(snap.points[0] >= last, "score went backwards");
        last = snap.points[0];
        if last == 20 {
            break;
        }
    }
}

#[tokio::test]
async fn every_viewer_gets_same_points_and_own_id() {
    let (addr, _server) = boot_server().await;
    let a = http_snapshot(addr, "/add_participant").await.id;
    let b = http_snapshot(addr, "/add_participant").await.id;
    let mut va = connect_viewer(addr, &a).await;
    let mut vb = connect_viewer(addr, &b).await;

    let _ = http_snapshot(addr, &format!("/increment_score?id={b}")).await;

    let sa = wait_for(&mut va, |s| s.points.iter().sum::<u64>() == 1).await;
    let sb = wait_for(&mut vb, |s| s.points.iter().sum::<u64>() == 1).await;
    assert_eq!(sa.id, a);
    assert_eq!(sb.id, b);
    assert_eq!(sa.points, sb.points);
}

#[tokio::test]
async fn points_are_ordered_by_identity() {
    let (addr, _server) = boot_server().await;
    for (id, times) in [("c", 2), ("a", 3), ("b", 1)] {
        for _ in 0..times {
            let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
        }
    }
    let snap = http_snapshot(addr, "/increment_score?id=a").await;
    assert_eq!(snap.points, vec![4, 1, 2]);
}

#[tokio::test]
async fn concurrent_http_increments_are_not_lost() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 25;
    let (addr, server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..PER_TASK {
                let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(server.registry().score(&id), Some((TASKS * PER_TASK) as u64));
}

#[tokio::test]
async fn disconnect_evicts_connection() {
    let (addr, server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;
    assert_eq!(server.registry().connection_count(), 1);

    viewer.close(None).await.unwrap();
    eventually(|| server.registry().connection_count() == 0).await;
    // Participant outlives its viewer.
    assert_eq!(server.registry().score(&id), Some(0));
}

#[tokio::test]
async fn dropped_viewer_does_not_block_others() {
    let (addr, server) = boot_server().await;
    let a = http_snapshot(addr, "/add_participant").await.id;
    let b = http_snapshot(addr, "/add_participant").await.id;
    let mut va = connect_viewer(addr, &a).await;
    let mut vb = connect_viewer(addr, &b).await;
    let _ = next_snapshot(&mut va).await;
    let _ = next_snapshot(&mut vb).await;

    drop(va);
    let _ = http_snapshot(addr, &format!("/increment_score?id={b}")).await;
    let snap = wait_for(&mut vb, |s| s.points.iter().sum::<u64>() == 1).await;
    assert_eq!(snap.id, b);
    eventually(|| server.registry().connection_count() == 1).await;
}

#[tokio::test]
async fn reconnect_replaces_and_closes_old_viewer() {
    let (addr, server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut old = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut old).await;

    let mut new = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut new).await;
    expect_closed(&mut old).await;

    // The replaced session's cleanup must not evict its successor.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.registry().connection_count(), 1);

    let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
    let snap = wait_for(&mut new, |s| s.points == vec![1]).await;
    assert_eq!(snap.id, id);
}

#[tokio::test]
async fn remove_participant_closes_viewer_and_updates_others() {
    let (addr, server) = boot_server().await;
    let a = http_snapshot(addr, "/add_participant").await.id;
    let b = http_snapshot(addr, "/add_participant").await.id;
    let mut va = connect_viewer(addr, &a).await;
    let mut vb = connect_viewer(addr, &b).await;
    let _ = next_snapshot(&mut va).await;
    let _ = next_snapshot(&mut vb).await;

    let resp = http_snapshot(addr, &format!("/remove_participant?id={a}")).await;
    assert_eq!(resp.id, a);
    assert_eq!(resp.points, vec![0]);

    expect_closed(&mut va).await;
    let snap = wait_for(&mut vb, |s| s.points.len() == 1).await;
    assert_eq!(snap.id, b);
    eventually(|| server.registry().connection_count() == 1).await;
    assert_eq!(server.registry().participant_count(), 1);
}

#[tokio::test]
async fn viewer_for_unknown_identity_is_accepted() {
    let (addr, server) = boot_server().await;
    let _ = http_snapshot(addr, "/add_participant").await;
    let mut viewer = connect_viewer(addr, "stranger").await;
    let snap = next_snapshot(&mut viewer).await;
    assert_eq!(snap.id, "stranger");
    assert_eq!(snap.points, vec![0]);
    assert_eq!(server.registry().participant_count(), 1);
}

#[tokio::test]
async fn connection_limit_refuses_upgrade() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_server_with(config).await;
    let a = http_snapshot(addr, "/add_participant").await.id;
    let b = http_snapshot(addr, "/add_participant").await.id;
    let mut va = connect_viewer(addr, &a).await;
    let _ = next_snapshot(&mut va).await;

    let refused = connect_async(format!("ws://{addr}/websocket?id={b}")).await;
    assert!(refused.is_err());
    assert_eq!(server.registry().connection_count(), 1);
}

#[tokio::test]
async fn reconnect_at_connection_limit_is_accepted() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_server_with(config).await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut old = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut old).await;

    let mut new = connect_viewer(addr, &id).await;
    let snap = next_snapshot(&mut new).await;
    assert_eq!(snap.id, id);
    expect_closed(&mut old).await;
    assert_eq!(server.registry().connection_count(), 1);
}

#[tokio::test]
async fn concurrent_upgrades_respect_connection_limit() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_server_with(config).await;

    let attempts = (0..20).map(|i| connect_async(format!("ws://{addr}/websocket?id=v{i}")));
    let results = futures::future::join_all(attempts).await;
    let accepted: Vec<_> = results.into_iter().filter_map(Result::ok).collect();

    assert_eq!(accepted.len(), 1);
    assert_eq!(server.registry().connection_count(), 1);
}

#[tokio::test]
async fn viewer_that_stops_draining_is_evicted() {
    let config = ServerConfig {
        outbound_buffer: 1,
        max_slow_drops: 2,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_server_with(config).await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;

    // Rounds run back to back without yielding, so the session never gets
    // to drain its one-slot queue.
    let evicted: usize = (0..5)
        .map(|_| server.dispatcher().broadcast_all().evicted)
        .sum();
    assert_eq!(evicted, 1);
    assert_eq!(server.registry().connection_count(), 0);

    expect_closed(&mut viewer).await;
    // Eviction drops the connection, not the participant.
    assert_eq!(server.registry().score(&id), Some(0));
}

#[tokio::test]
async fn graceful_shutdown_drains_viewer_sessions() {
    let server = ScoreServer::new(
        ServerConfig::default(),
        scoreboard_server::metrics::detached_handle(),
    );
    let (addr, handle) = server.listen().await.unwrap();
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;
    assert_eq!(server.shutdown().active_sessions(), 1);

    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(TIMEOUT))
        .await;

    // Sessions finished their cleanup before the drain returned.
    assert_eq!(server.shutdown().active_sessions(), 0);
    assert_eq!(server.registry().connection_count(), 0);
    expect_closed(&mut viewer).await;
}

#[tokio::test]
async fn shutdown_closes_viewers() {
    let (addr, server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;

    server.shutdown().shutdown();
    expect_closed(&mut viewer).await;
    eventually(|| server.registry().connection_count() == 0).await;
}

#[tokio::test]
async fn inbound_frames_are_ignored() {
    let (addr, server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;

    viewer.send(Message::Text("hello".into())).await.unwrap();
    let _ = http_snapshot(addr, &format!("/increment_score?id={id}")).await;
    let snap = wait_for(&mut viewer, |s| s.points == vec![1]).await;
    assert_eq!(snap.id, id);
    assert_eq!(server.registry().connection_count(), 1);
}

#[tokio::test]
async fn health_reports_live_connections() {
    let (addr, _server) = boot_server().await;
    let id = http_snapshot(addr, "/add_participant").await.id;
    let mut viewer = connect_viewer(addr, &id).await;
    let _ = next_snapshot(&mut viewer).await;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["participants"], 1);
}
