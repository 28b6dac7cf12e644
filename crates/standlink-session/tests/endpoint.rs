//! End-to-end session tests: a real hub and tablet pair over localhost.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use standlink_core::{EndpointOptions, SessionError, StandInfo, TrailingDigitsExtractor};
use standlink_protocol::commands::{StandConnectCommand, StandStateCommand};
use standlink_protocol::{envelope, Command, CommandRegistry};
use standlink_session::{EndpointEvent, LaptopServer, SessionState, TabletClient};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const DEADLINE: Duration = Duration::from_secs(5);

fn hub_options() -> EndpointOptions {
    EndpointOptions {
        port: 0,
        monitor_interval: Duration::from_millis(100),
        ..EndpointOptions::default()
    }
}

fn tablet_options(port: u16) -> EndpointOptions {
    EndpointOptions {
        server_address: "127.0.0.1".to_owned(),
        port,
        monitor_interval: Duration::from_millis(100),
        ..EndpointOptions::default()
    }
}

fn registry() -> Arc<CommandRegistry> {
    CommandRegistry::with_builtin_commands(Arc::new(TrailingDigitsExtractor))
}

fn connect_command(stand_number: u32) -> Command {
    Command::StandConnect(StandConnectCommand {
        stand_number,
        stand_state: None,
        is_connect: true,
    })
}

fn state_command(stand_number: u32) -> Command {
    Command::StandState(StandStateCommand {
        stand_number,
        stand_state: Default::default(),
    })
}

#[tokio::test]
async fn hub_routes_stand_connect_to_context_handler() {
    let hub_registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub_registry
        .set_context_handler("StandConnectCommand", move |stand, command| {
            tx.send((stand, command)).map_err(|e| anyhow::anyhow!(e))
        })
        .expect("shape registered");

    let mut options = hub_options();
    options.peer_name = Some("stand12".to_owned());
    let server = LaptopServer::new(options, hub_registry);
    let port = server.start().await.expect("hub start").port();

    let client = TabletClient::new(tablet_options(port), registry());
    client.connect().await.expect("connect");
    assert_eq!(client.state(), SessionState::Open);

    client.send(&connect_command(12)).await.expect("send");

    let (stand, command) = timeout(DEADLINE, rx.recv())
        .await
        .expect("handler within deadline")
        .expect("handler fired");
    assert_eq!(stand, StandInfo { name: "stand12".to_owned(), stand_number: 12 });
    assert_eq!(command, connect_command(12));

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn named_hub_still_reaches_plain_handlers() {
    // A hub routing on its own stand name must not starve shapes that only
    // installed a context-free handler (telemetry, emergency shutdown).
    let hub_registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub_registry
        .set_handler("StandStateCommand", move |command| {
            tx.send(command).map_err(|e| anyhow::anyhow!(e))
        })
        .expect("shape registered");

    let mut options = hub_options();
    options.peer_name = Some("stand12".to_owned());
    let server = LaptopServer::new(options, hub_registry);
    let port = server.start().await.expect("hub start").port();

    let client = TabletClient::new(tablet_options(port), registry());
    client.connect().await.expect("connect");
    client.send(&state_command(12)).await.expect("send");

    let command = timeout(DEADLINE, rx.recv())
        .await
        .expect("frame within deadline")
        .expect("handler fired");
    assert_eq!(command, state_command(12));

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn concurrent_sends_arrive_as_whole_frames() {
    let hub_registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub_registry
        .set_handler("StandStateCommand", move |command| {
            tx.send(command).map_err(|e| anyhow::anyhow!(e))
        })
        .expect("shape registered");

    let server = LaptopServer::new(hub_options(), hub_registry);
    let port = server.start().await.expect("hub start").port();

    let client = Arc::new(TabletClient::new(tablet_options(port), registry()));
    client.connect().await.expect("connect");

    let tasks: u32 = 8;
    let per_task: u32 = 5;
    let mut handles = Vec::new();
    for task in 0..tasks {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            for i in 0..per_task {
                client.send(&state_command(task * per_task + i)).await.expect("send");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("sender task");
    }

    // Every frame decodes cleanly on the hub side: no interleaved writes.
    let mut seen = Vec::new();
    for _ in 0..tasks * per_task {
        let command = timeout(DEADLINE, rx.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open");
        seen.push(command.stand_number());
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..tasks * per_task).collect::<Vec<_>>());

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn disconnect_is_idempotent_and_fires_one_event() {
    let server = LaptopServer::new(hub_options(), registry());
    let port = server.start().await.expect("hub start").port();

    let client = TabletClient::new(tablet_options(port), registry());
    let mut events = client.subscribe();
    client.connect().await.expect("connect");

    tokio::join!(client.disconnect(), client.disconnect());
    client.disconnect().await;
    assert_eq!(client.state(), SessionState::Disconnected);

    // Give any stray background teardown a moment, then drain.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut ups = 0;
    let mut downs = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EndpointEvent::Connectivity(true) => ups += 1,
            EndpointEvent::Connectivity(false) => downs += 1,
            EndpointEvent::ServerStatus(_) => {}
        }
    }
    assert_eq!(ups, 1, "exactly one connectivity(true)");
    assert_eq!(downs, 1, "exactly one connectivity(false)");

    server.stop().await;
}

#[tokio::test]
async fn connect_refuses_while_open_and_endpoint_is_reusable() {
    let server = LaptopServer::new(hub_options(), registry());
    let port = server.start().await.expect("hub start").port();

    let client = TabletClient::new(tablet_options(port), registry());
    client.connect().await.expect("first connect");
    assert!(matches!(client.connect().await, Err(SessionError::AlreadyConnected)));

    client.disconnect().await;
    client.connect().await.expect("reconnect after disconnect");
    assert_eq!(client.state(), SessionState::Open);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_receive_loop() {
    let hub_registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub_registry
        .set_handler("StandConnectCommand", move |command| {
            tx.send(command).map_err(|e| anyhow::anyhow!(e))
        })
        .expect("shape registered");

    let server = LaptopServer::new(hub_options(), hub_registry);
    let port = server.start().await.expect("hub start").port();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/"))
        .await
        .expect("raw websocket");

    // Unparseable, then unknown discriminator, then a valid frame.
    ws.send(Message::Text("{not json".to_owned())).await.expect("send");
    ws.send(Message::Text(r#"{"CommandName":"Bogus"}"#.to_owned())).await.expect("send");
    let valid = envelope::encode(&connect_command(3)).expect("encode");
    ws.send(Message::Text(valid)).await.expect("send");

    let command = timeout(DEADLINE, rx.recv())
        .await
        .expect("valid frame within deadline")
        .expect("handler fired");
    assert_eq!(command, connect_command(3));

    server.stop().await;
}

#[tokio::test]
async fn monitor_disconnects_when_peer_becomes_unreachable() {
    // Hand-rolled hub: accept one upgrade, then vanish from the probe port
    // while holding the transport open (half-open link).
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let peer_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
        drop(listener);
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(ws);
    });

    let client = TabletClient::new(tablet_options(port), registry());
    let mut events = client.subscribe();
    client.connect().await.expect("connect");
    assert_eq!(
        timeout(DEADLINE, events.recv()).await.expect("event").expect("channel"),
        EndpointEvent::Connectivity(true)
    );

    // The transport still looks open; only the out-of-band probe fails.
    assert_eq!(
        timeout(DEADLINE, events.recv()).await.expect("event").expect("channel"),
        EndpointEvent::Connectivity(false)
    );
    assert_eq!(client.state(), SessionState::Disconnected);

    peer_task.abort();
}

#[tokio::test]
async fn send_fails_fast_when_not_open() {
    let client = TabletClient::new(tablet_options(1), registry());
    assert!(matches!(
        client.send(&connect_command(1)).await,
        Err(SessionError::NotConnected)
    ));

    // Nothing listens on port 1: connect fails and the session stays down.
    assert!(client.connect().await.is_err());
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn second_upgrade_replaces_prior_session() {
    let hub_registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub_registry
        .set_handler("StandConnectCommand", move |command| {
            tx.send(command).map_err(|e| anyhow::anyhow!(e))
        })
        .expect("shape registered");

    let server = LaptopServer::new(hub_options(), hub_registry);
    let port = server.start().await.expect("hub start").port();

    let first = TabletClient::new(tablet_options(port), registry());
    first.connect().await.expect("first connect");

    let second = TabletClient::new(tablet_options(port), registry());
    second.connect().await.expect("second connect");

    second.send(&connect_command(7)).await.expect("send on new session");
    let command = timeout(DEADLINE, rx.recv())
        .await
        .expect("frame within deadline")
        .expect("handler fired");
    assert_eq!(command, connect_command(7));

    // The replaced tablet observes the close and winds down on its own.
    timeout(DEADLINE, async {
        while first.state() != SessionState::Disconnected {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("first session torn down");

    second.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn stale_receive_loop_never_faults_a_replacement_session() {
    let server = LaptopServer::new(hub_options(), registry());
    let port = server.start().await.expect("hub start").port();

    let client = TabletClient::new(tablet_options(port), registry());
    let mut events = client.subscribe();
    client.connect().await.expect("connect");

    // Tear down and immediately restart: the prior generation's close frame
    // may still be in flight while the new session opens.
    client.disconnect().await;
    client.connect().await.expect("reconnect");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.state(), SessionState::Open);

    let mut downs = 0;
    while let Ok(event) = events.try_recv() {
        if event == EndpointEvent::Connectivity(false) {
            downs += 1;
        }
    }
    assert_eq!(downs, 1, "only the first generation may report teardown");

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn hub_emits_server_status_events() {
    let server = LaptopServer::new(hub_options(), registry());
    let mut events = server.subscribe();

    server.start().await.expect("hub start");
    server.stop().await;

    assert_eq!(
        timeout(DEADLINE, events.recv()).await.expect("event").expect("channel"),
        EndpointEvent::ServerStatus(true)
    );
    assert_eq!(
        timeout(DEADLINE, events.recv()).await.expect("event").expect("channel"),
        EndpointEvent::ServerStatus(false)
    );
}
