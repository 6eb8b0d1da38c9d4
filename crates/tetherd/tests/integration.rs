//! Integration tests for tetherd
//!
//! These drive the request handler with a mock backend, both directly and
//! through a real Unix socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether_api::{
    ClientInfo, ClientRole, Command, ErrorCode, EventPayload, Interface, InterfaceKind,
    ResponsePayload, ResponseResult, SessionPhase, SharingConfig, SharingMode,
};
use tether_core::{EngineOptions, SessionEngine};
use tether_host_api::{MockBackend, StaticInventory};
use tether_ipc::{IpcClient, IpcServer};
use tether_store::{AuditEventType, SqliteStore, Store};
use tether_util::ProfileName;
use tetherd::{CommandHandler, spawn_status_forwarder};

struct TestDaemon {
    handler: Arc<CommandHandler>,
    backend: Arc<MockBackend>,
    store: Arc<SqliteStore>,
    socket_path: PathBuf,
    _dir: TempDir,
}

async fn daemon(requests_per_minute: usize) -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("tether.sock");

    let backend = Arc::new(MockBackend::new());
    let inventory = Arc::new(StaticInventory::new(vec![
        Interface::new("eth0", InterfaceKind::Wired).with_ip("192.168.1.5"),
        Interface::new("wlan0", InterfaceKind::Wireless),
    ]));
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SessionEngine::new(
        backend.clone(),
        inventory,
        store.clone(),
        EngineOptions::default(),
    ));

    let mut ipc = IpcServer::new(&socket_path, 16);
    ipc.start().await.unwrap();
    let ipc = Arc::new(ipc);
    let mut inbox = ipc.take_message_receiver().await.unwrap();

    let handler = Arc::new(CommandHandler::new(
        engine.clone(),
        store.clone(),
        ipc.clone(),
        requests_per_minute,
    ));

    spawn_status_forwarder(&engine, ipc.clone());

    let accept = ipc.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });

    let dispatch = handler.clone();
    tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            dispatch.handle_message(msg).await;
        }
    });

    TestDaemon {
        handler,
        backend,
        store,
        socket_path,
        _dir: dir,
    }
}

fn hotspot() -> SharingConfig {
    SharingConfig::new(SharingMode::Hotspot, "eth0", "wlan0")
        .with_ssid("Test")
        .with_password("longenough")
        .with_channel(6)
        .with_ip_range("10.0.0.0/24")
}

fn admin() -> ClientInfo {
    ClientInfo::new(ClientRole::Admin)
}

fn error_code(result: ResponseResult) -> ErrorCode {
    match result {
        ResponseResult::Err(e) => e.code,
        ResponseResult::Ok(payload) => panic!("expected error, got {:?}", payload),
    }
}

#[tokio::test]
async fn hotspot_over_socket() {
    let d = daemon(60).await;
    let mut client = IpcClient::connect(&d.socket_path).await.unwrap();

    match client.call(Command::ListInterfaces).await.unwrap() {
        ResponsePayload::Interfaces { interfaces } => {
            let names: Vec<_> = interfaces.iter().map(|i| i.name.as_str()).collect();
            assert_eq!(names, vec!["eth0", "wlan0"]);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let started = client
        .call(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();
    assert!(matches!(started, ResponsePayload::Started(ref s) if s.active));
    assert_eq!(d.backend.apply_calls(), vec![hotspot()]);

    match client.call(Command::GetStatus).await.unwrap() {
        ResponsePayload::Status(snap) => {
            assert!(snap.active);
            assert_eq!(snap.source_interface.as_deref(), Some("eth0"));
            assert_eq!(snap.target_interface.as_deref(), Some("wlan0"));
            assert_eq!(snap.mode, Some(SharingMode::Hotspot));
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let stopped = client.call(Command::StopSharing).await.unwrap();
    assert!(matches!(stopped, ResponsePayload::Stopped(ref s) if !s.active && s.uptime == 0));
}

#[tokio::test]
async fn error_codes_over_socket() {
    let d = daemon(60).await;
    let mut client = IpcClient::connect(&d.socket_path).await.unwrap();

    let same = SharingConfig::new(SharingMode::Nat, "eth0", "eth0");
    let response = client.send(Command::StartSharing { config: same }).await.unwrap();
    assert_eq!(error_code(response.result), ErrorCode::ValidationFailed);

    let response = client
        .send(Command::StartSharing {
            config: hotspot().with_password("short"),
        })
        .await
        .unwrap();
    assert_eq!(error_code(response.result), ErrorCode::ValidationFailed);
    assert_eq!(d.backend.apply_count(), 0);

    let response = client.send(Command::StopSharing).await.unwrap();
    assert_eq!(error_code(response.result), ErrorCode::Conflict);

    client
        .call(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();
    let response = client
        .send(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();
    assert_eq!(error_code(response.result), ErrorCode::Conflict);

    d.backend.set_fail_revert(true);
    let response = client.send(Command::StopSharing).await.unwrap();
    assert_eq!(error_code(response.result), ErrorCode::ApplyFailed);
    assert_eq!(d.handler.engine().phase(), SessionPhase::Inactive);
}

#[tokio::test]
async fn subscriber_sees_changes() {
    let d = daemon(60).await;
    let mut watcher = IpcClient::connect(&d.socket_path).await.unwrap();
    let mut controller = IpcClient::connect(&d.socket_path).await.unwrap();

    let initial = watcher.subscribe().await.unwrap();
    assert!(!initial.active);

    controller
        .call(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), watcher.next_event())
        .await
        .unwrap()
        .unwrap();
    match event.payload {
        EventPayload::StatusChanged(snap) => {
            assert!(snap.active);
            assert_eq!(snap.target_interface.as_deref(), Some("wlan0"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    controller.call(Command::StopSharing).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), watcher.next_event())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.payload, EventPayload::StatusChanged(s) if !s.active));

    match watcher.call(Command::GetHealth).await.unwrap() {
        ResponsePayload::Health(health) => {
            assert!(health.ready);
            assert_eq!(health.observers, 1);
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn late_subscriber_gets_current_state() {
    let d = daemon(60).await;
    let mut controller = IpcClient::connect(&d.socket_path).await.unwrap();
    controller
        .call(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();

    let mut late = IpcClient::connect(&d.socket_path).await.unwrap();
    let snapshot = late.subscribe().await.unwrap();
    assert!(snapshot.active);
    assert_eq!(snapshot.source_interface.as_deref(), Some("eth0"));
}

#[tokio::test]
async fn status_stays_responsive_during_apply() {
    let d = daemon(60).await;
    d.backend.set_delay(Some(Duration::from_millis(300)));

    let path = d.socket_path.clone();
    let first = tokio::spawn(async move {
        let mut client = IpcClient::connect(&path).await.unwrap();
        client.send(Command::StartSharing { config: hotspot() }).await.unwrap()
    });

    while d.handler.engine().phase() != SessionPhase::Starting {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut other = IpcClient::connect(&d.socket_path).await.unwrap();
    match other.call(Command::GetStatus).await.unwrap() {
        ResponsePayload::Status(snap) => {
            assert_eq!(snap.phase, SessionPhase::Starting);
            assert!(!snap.active);
        }
        payload => panic!("unexpected payload {:?}", payload),
    }

    let response = other
        .send(Command::StartSharing { config: hotspot() })
        .await
        .unwrap();
    assert_eq!(error_code(response.result), ErrorCode::Conflict);

    assert!(first.await.unwrap().is_ok());
    assert_eq!(d.backend.apply_count(), 1);
}

#[tokio::test]
async fn profiles() {
    let d = daemon(60).await;
    let h = &d.handler;
    let config = hotspot();

    let response = h
        .handle_command(
            &admin(),
            1,
            Command::SaveProfile {
                name: "home".into(),
                config: config.clone(),
            },
        )
        .await;
    assert!(response.is_ok());

    let response = h
        .handle_command(&admin(), 2, Command::LoadProfile { name: "home".into() })
        .await;
    match response.result {
        ResponseResult::Ok(ResponsePayload::Profile { name, config: loaded }) => {
            assert_eq!(name.as_str(), "home");
            assert_eq!(loaded, config);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let response = h
        .handle_command(
            &admin(),
            3,
            Command::SaveProfile {
                name: "".into(),
                config: config.clone(),
            },
        )
        .await;
    assert_eq!(error_code(response.result), ErrorCode::InvalidName);

    let response = h.handle_command(&admin(), 4, Command::ListProfiles).await;
    match response.result {
        ResponseResult::Ok(ResponsePayload::Profiles { names }) => {
            assert_eq!(names, vec![ProfileName::from("home")]);
        }
        other => panic!("unexpected result {:?}", other),
    }

    for request_id in [5, 6] {
        let response = h
            .handle_command(&admin(), request_id, Command::DeleteProfile { name: "home".into() })
            .await;
        if request_id == 5 {
            assert!(response.is_ok());
        } else {
            assert_eq!(error_code(response.result), ErrorCode::NotFound);
        }
    }

    let response = h
        .handle_command(&admin(), 7, Command::LoadProfile { name: "home".into() })
        .await;
    assert_eq!(error_code(response.result), ErrorCode::NotFound);

    let audits = d.store.recent_audits(10).unwrap();
    assert!(matches!(audits[0].event, AuditEventType::ProfileDeleted { .. }));
}

#[tokio::test]
async fn start_profile() {
    let d = daemon(60).await;
    let h = &d.handler;

    let response = h
        .handle_command(&admin(), 1, Command::StartProfile { name: "cafe".into() })
        .await;
    assert_eq!(error_code(response.result), ErrorCode::NotFound);
    assert_eq!(d.backend.apply_count(), 0);

    h.handle_command(
        &admin(),
        2,
        Command::SaveProfile {
            name: "cafe".into(),
            config: hotspot(),
        },
    )
    .await;

    let response = h
        .handle_command(&admin(), 3, Command::StartProfile { name: "cafe".into() })
        .await;
    assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Started(_))));
    assert_eq!(d.backend.apply_calls(), vec![hotspot()]);
}

#[tokio::test]
async fn observers_are_read_only() {
    let d = daemon(60).await;
    let observer = ClientInfo::new(ClientRole::Observer);

    let response = d
        .handler
        .handle_command(&observer, 1, Command::StartSharing { config: hotspot() })
        .await;
    assert_eq!(error_code(response.result), ErrorCode::PermissionDenied);
    assert_eq!(d.backend.apply_count(), 0);

    let response = d
        .handler
        .handle_command(
            &observer,
            2,
            Command::SaveProfile {
                name: "x".into(),
                config: hotspot(),
            },
        )
        .await;
    assert_eq!(error_code(response.result), ErrorCode::PermissionDenied);

    let response = d.handler.handle_command(&observer, 3, Command::GetStatus).await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn rate_limited_client() {
    let d = daemon(2).await;
    let mut client = IpcClient::connect(&d.socket_path).await.unwrap();

    assert!(client.send(Command::Ping).await.unwrap().is_ok());
    assert!(client.send(Command::Ping).await.unwrap().is_ok());

    let response = client.send(Command::Ping).await.unwrap();
    assert_eq!(error_code(response.result), ErrorCode::RateLimited);

    // Limits are per client
    let mut other = IpcClient::connect(&d.socket_path).await.unwrap();
    assert!(other.send(Command::Ping).await.unwrap().is_ok());
}

#[tokio::test]
async fn inventory_outage_reported() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = Arc::new(StaticInventory::new(vec![]));
    inventory.set_unavailable(true);
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Arc::new(SessionEngine::new(
        Arc::new(MockBackend::new()),
        inventory,
        store.clone(),
        EngineOptions::default(),
    ));
    let ipc = Arc::new(IpcServer::new(dir.path().join("unused.sock"), 4));
    let handler = CommandHandler::new(engine, store, ipc, 60);

    let response = handler.handle_command(&admin(), 1, Command::ListInterfaces).await;
    assert_eq!(error_code(response.result), ErrorCode::InventoryUnavailable);

    let health = handler.health().await;
    assert!(health.live);
    assert!(!health.inventory_ok);
}

#[tokio::test]
async fn backend_problems_make_daemon_unready() {
    let d = daemon(60).await;
    d.backend
        .set_diagnostics(vec!["hostapd not found at hostapd".into()]);

    let health = d.handler.health().await;
    assert!(health.live);
    assert!(!health.ready);
    assert!(!health.backend_ok);
    assert_eq!(health.backend_issues, vec!["hostapd not found at hostapd"]);
}
