//! End-to-end machines over loopback TCP.

use codec::ActorId;
use machine_actors::{
    EventKind, FileSink, Machine, MachineError, MachineOptions, MemorySink,
};
use machine_config::{MachineConfig, PeerAddress, SimulationSettings};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn settings() -> SimulationSettings {
    SimulationSettings {
        send_one_weight: 1,
        send_all_weight: 1,
        internal_weight: 1,
        connect_grace_ms: 5_000,
        connect_base_delay_ms: 20,
        connect_max_delay_ms: 200,
        shutdown_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn config_for(ports: &[(u32, u16)], simulation: SimulationSettings) -> MachineConfig {
    let machines: BTreeMap<String, PeerAddress> = ports
        .iter()
        .map(|(id, port)| {
            (
                id.to_string(),
                PeerAddress {
                    host: "127.0.0.1".to_string(),
                    port: *port,
                },
            )
        })
        .collect();
    MachineConfig::from_parts(machines, simulation).unwrap()
}

fn options(rate: u32, seed: u64) -> MachineOptions {
    MachineOptions {
        log_dir: None,
        rate: Some(rate),
        seed: Some(seed),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_machines_exchange_messages() {
    let config = config_for(&[(1, free_port()), (2, free_port())], settings());
    let sink_1 = MemorySink::new();
    let sink_2 = MemorySink::new();

    let mut m1 = Machine::with_sink(&config, ActorId::new(1), options(20, 1), Box::new(sink_1.clone()))
        .unwrap();
    let mut m2 = Machine::with_sink(&config, ActorId::new(2), options(20, 2), Box::new(sink_2.clone()))
        .unwrap();

    let (r1, r2) = tokio::join!(m1.start(), m2.start());
    r1.unwrap();
    r2.unwrap();
    assert!(m1.transport().is_connected(ActorId::new(2)));
    assert!(m2.transport().is_connected(ActorId::new(1)));

    sleep(Duration::from_millis(1500)).await;

    let s1 = m1.shutdown().await.unwrap();
    let s2 = m2.shutdown().await.unwrap();

    for (sink, summary) in [(&sink_1, s1), (&sink_2, s2)] {
        let records = sink.records();
        assert!(!records.is_empty());
        assert_eq!(records.len() as u64, summary.events_processed);
        assert_eq!(records.last().unwrap().clock, summary.clock);

        for pair in records.windows(2) {
            assert!(pair[1].clock > pair[0].clock);
        }
        for record in records.iter().filter(|r| r.kind == EventKind::Receive) {
            assert!(record.clock > record.message_clock.unwrap());
        }
    }

    let receives = sink_1
        .records()
        .iter()
        .chain(sink_2.records().iter())
        .filter(|r| r.kind == EventKind::Receive)
        .count();
    assert!(receives > 0, "no message crossed the link");
}

#[tokio::test]
async fn test_lone_machine_logs_internal_events_to_file() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&[(1, free_port())], settings());
    let machine = Machine::new(
        &config,
        ActorId::new(1),
        MachineOptions {
            log_dir: Some(dir.path().to_path_buf()),
            rate: Some(10),
            seed: Some(3),
        },
    )
    .unwrap();

    let summary = machine
        .run_until(sleep(Duration::from_millis(600)))
        .await
        .unwrap()
        .unwrap();

    let log = std::fs::read_to_string(FileSink::log_path(dir.path(), ActorId::new(1))).unwrap();
    assert!(log.contains("Machine 1 log started"));
    assert!(log.contains("Clock rate: 10 ticks per second"));
    assert!(log.contains("| INTERNAL |"));
    assert!(!log.contains("| SEND |"));
    assert_eq!(log.matches("| INTERNAL |").count() as u64, summary.events_processed);
}

#[tokio::test]
async fn test_unreachable_peer_fails_startup() {
    let simulation = SimulationSettings {
        connect_grace_ms: 300,
        ..settings()
    };
    let config = config_for(&[(1, free_port()), (2, free_port())], simulation);
    let mut machine = Machine::with_sink(
        &config,
        ActorId::new(1),
        options(5, 1),
        Box::new(MemorySink::new()),
    )
    .unwrap();

    let err = machine.start().await.unwrap_err();
    assert!(matches!(err, MachineError::Transport(_)));
    assert_eq!(err.category(), "connection");
}

#[tokio::test]
async fn test_unknown_machine_is_rejected() {
    let config = config_for(&[(1, free_port())], settings());
    let err = Machine::with_sink(
        &config,
        ActorId::new(7),
        MachineOptions::default(),
        Box::new(MemorySink::new()),
    )
    .unwrap_err();

    assert!(matches!(err, MachineError::Config(_)));
}

#[tokio::test]
async fn test_tick_rate_drawn_from_configured_range() {
    let simulation = SimulationSettings {
        min_rate: 2,
        max_rate: 4,
        ..settings()
    };
    let config = config_for(&[(1, free_port())], simulation);

    for seed in 0..20 {
        let machine = Machine::with_sink(
            &config,
            ActorId::new(1),
            MachineOptions {
                seed: Some(seed),
                ..Default::default()
            },
            Box::new(MemorySink::new()),
        )
        .unwrap();
        assert!((2..=4).contains(&machine.tick_rate()));
    }

    let err = Machine::with_sink(&config, ActorId::new(1), options(0, 1), Box::new(MemorySink::new()))
        .unwrap_err();
    assert!(matches!(err, MachineError::Config(_)));
}
