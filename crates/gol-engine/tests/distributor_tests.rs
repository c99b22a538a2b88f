//! Integration tests for the distributor: local runs, key handling, remote
//! runs against a gateway on an ephemeral port, and failure paths.
//!
//! Every test works in its own temporary directory.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::path::Path;
use std::sync::Arc;

use gol_core::config::{GolConfig, RunMode};
use gol_core::grid::Grid;
use gol_engine::distributor::{distributor, DistributorChannels};
use gol_engine::error::DistributorError;
use gol_engine::pgm::{self, PgmStore};
use gol_gateway::{serve, GatewayState};
use gol_types::{Coord, Event, Params, Phase};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn glider() -> Grid {
    Grid::with_alive(
        16,
        16,
        [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)].map(|(x, y)| Coord::new(x, y)),
    )
    .unwrap()
}

fn params(turns: u64) -> Params {
    Params {
        width: 16,
        height: 16,
        turns,
        workers: 4,
    }
}

/// A config rooted in a fresh temporary directory holding `16x16.pgm`.
fn setup() -> (TempDir, GolConfig) {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("16x16.pgm"), pgm::encode(&glider())).unwrap();

    let mut config = GolConfig::default();
    config.io.images_dir = images.display().to_string();
    config.io.out_dir = dir.path().join("out").display().to_string();
    config.engine.ticker_interval_ms = 20;
    config.engine.query_timeout_ms = 5000;
    (dir, config)
}

fn read_output(config: &GolConfig, name: &str) -> Grid {
    let path = Path::new(&config.io.out_dir).join(format!("{name}.pgm"));
    pgm::decode(&path, &std::fs::read(&path).unwrap()).unwrap()
}

/// Run the distributor with `keys` pressed up front and collect every
/// event until the stream closes.
async fn run_with_keys(
    params: Params,
    config: &GolConfig,
    keys: &[char],
) -> (Result<gol_engine::distributor::RunReport, DistributorError>, Vec<Event>) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (keys_tx, keys_rx) = mpsc::channel(keys.len().max(1));
    for &key in keys {
        keys_tx.send(key).await.unwrap();
    }
    drop(keys_tx);

    let store = PgmStore::new(&config.io);
    let channels = DistributorChannels {
        events: events_tx,
        keys: keys_rx,
    };
    let result = distributor(params, config, &store, channels).await;

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn turn_completes(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::TurnComplete { turn } => Some(*turn),
            _ => None,
        })
        .collect()
}

fn assert_ends_with_quitting(events: &[Event], turn: u64) {
    assert_eq!(
        events.last(),
        Some(&Event::StateChange {
            turn,
            phase: Phase::Quitting
        })
    );
}

async fn spawn_gateway(config: &mut GolConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.client.server_url = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(GatewayState::new(config.engine.clone()));
    tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });
}

// =========================================================================
// Local runs
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_run_writes_final_image() {
    let (_dir, config) = setup();
    let (result, events) = run_with_keys(params(8), &config, &[]).await;

    let report = result.unwrap();
    assert_eq!(report.turn, 8);
    assert_eq!(report.alive, 5);
    assert!(report.output.ends_with("16x16x8.pgm"));
    assert_eq!(read_output(&config, "16x16x8"), glider().shifted(2, 2));

    assert_eq!(turn_completes(&events), (1..=8).collect::<Vec<_>>());
    assert!(events.contains(&Event::StateChange {
        turn: 0,
        phase: Phase::Executing
    }));

    let tail: Vec<&Event> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::FinalTurnComplete { .. }
                    | Event::ImageOutputComplete { .. }
                    | Event::StateChange {
                        phase: Phase::Quitting,
                        ..
                    }
            )
        })
        .collect();
    assert_eq!(tail.len(), 3);
    assert!(matches!(tail[0], Event::FinalTurnComplete { turn: 8, alive } if alive.len() == 5));
    assert_eq!(
        tail[1],
        &Event::ImageOutputComplete {
            turn: 8,
            filename: "16x16x8".to_owned()
        }
    );
    assert_ends_with_quitting(&events, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_key_ends_run_early() {
    let (_dir, config) = setup();
    let (result, events) = run_with_keys(params(u64::MAX), &config, &['x', 'q']).await;

    let report = result.unwrap();
    let turns = turn_completes(&events);
    assert_eq!(turns.last().copied().unwrap_or(0), report.turn);
    assert!(Path::new(&config.io.out_dir)
        .join(format!("16x16x{}.pgm", report.turn))
        .exists());
    assert_ends_with_quitting(&events, report.turn);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_save_resume_then_kill() {
    let (_dir, config) = setup();
    let (result, events) = run_with_keys(params(u64::MAX), &config, &['p', 's', 'p', 'k']).await;
    let report = result.unwrap();

    let paused_at = events
        .iter()
        .find_map(|e| match e {
            Event::StateChange {
                turn,
                phase: Phase::Paused,
            } => Some(*turn),
            _ => None,
        })
        .unwrap();
    assert!(events.contains(&Event::StateChange {
        turn: paused_at,
        phase: Phase::Executing
    }));

    // The saved image shows the grid frozen at the pause.
    let saved = format!("16x16x{paused_at}");
    assert!(events.contains(&Event::ImageOutputComplete {
        turn: paused_at,
        filename: saved.clone()
    }));
    let image = read_output(&config, &saved);
    assert_eq!(image.alive_count(), 5);

    assert!(report.turn >= paused_at);
    assert_ends_with_quitting(&events, report.turn);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_run_quits_when_keys_end() {
    let (_dir, config) = setup();
    let (result, events) = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        run_with_keys(params(u64::MAX), &config, &['p']),
    )
    .await
    .unwrap();
    let report = result.unwrap();

    let paused_at = events
        .iter()
        .find_map(|e| match e {
            Event::StateChange {
                turn,
                phase: Phase::Paused,
            } => Some(*turn),
            _ => None,
        })
        .unwrap();
    assert_eq!(report.turn, paused_at);
    assert_eq!(turn_completes(&events).last().copied().unwrap_or(0), paused_at);
    assert!(Path::new(&config.io.out_dir)
        .join(format!("16x16x{paused_at}.pgm"))
        .exists());
    assert_ends_with_quitting(&events, paused_at);
}

#[tokio::test]
async fn missing_input_image_fails_cleanly() {
    let (_dir, config) = setup();
    let missing = Params {
        width: 32,
        height: 32,
        turns: 1,
        workers: 1,
    };
    let (result, events) = run_with_keys(missing, &config, &[]).await;
    assert!(matches!(result, Err(DistributorError::Image { .. })));
    assert_eq!(
        events,
        vec![Event::StateChange {
            turn: 0,
            phase: Phase::Quitting
        }]
    );
}

// =========================================================================
// Remote runs
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_run_matches_local_run() {
    let (_dir, mut config) = setup();
    config.run.mode = RunMode::Remote;
    spawn_gateway(&mut config).await;

    let (result, events) = run_with_keys(params(8), &config, &[]).await;
    let report = result.unwrap();
    assert_eq!(report.turn, 8);
    assert_eq!(read_output(&config, "16x16x8"), glider().shifted(2, 2));

    assert_eq!(
        events.first(),
        Some(&Event::StateChange {
            turn: 0,
            phase: Phase::Executing
        })
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::FinalTurnComplete { turn: 8, alive } if alive.len() == 5)));
    assert_ends_with_quitting(&events, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_quit_key_ends_run() {
    let (_dir, mut config) = setup();
    config.run.mode = RunMode::Remote;
    spawn_gateway(&mut config).await;

    // Give the run a moment to register before quitting it.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (keys_tx, keys_rx) = mpsc::channel(4);
    let quitter = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        keys_tx.send('q').await.unwrap();
    });

    let store = PgmStore::new(&config.io);
    let report = distributor(
        params(u64::MAX),
        &config,
        &store,
        DistributorChannels {
            events: events_tx,
            keys: keys_rx,
        },
    )
    .await
    .unwrap();
    quitter.await.unwrap();

    assert!(Path::new(&config.io.out_dir)
        .join(format!("16x16x{}.pgm", report.turn))
        .exists());
    let mut last = None;
    while let Some(event) = events_rx.recv().await {
        last = Some(event);
    }
    assert_eq!(
        last,
        Some(Event::StateChange {
            turn: report.turn,
            phase: Phase::Quitting
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_paused_run_quits_when_keys_end() {
    let (_dir, mut config) = setup();
    config.run.mode = RunMode::Remote;
    spawn_gateway(&mut config).await;

    // Pause once the run has registered, then close the key stream.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (keys_tx, keys_rx) = mpsc::channel(1);
    let presser = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        keys_tx.send('p').await.unwrap();
    });

    let store = PgmStore::new(&config.io);
    let run = distributor(
        params(u64::MAX),
        &config,
        &store,
        DistributorChannels {
            events: events_tx,
            keys: keys_rx,
        },
    );
    let report = tokio::time::timeout(std::time::Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap();
    presser.await.unwrap();

    assert!(Path::new(&config.io.out_dir)
        .join(format!("16x16x{}.pgm", report.turn))
        .exists());
    let mut last = None;
    while let Some(event) = events_rx.recv().await {
        last = Some(event);
    }
    assert_eq!(
        last,
        Some(Event::StateChange {
            turn: report.turn,
            phase: Phase::Quitting
        })
    );
}

#[tokio::test]
async fn unreachable_server_fails_without_image() {
    let (_dir, mut config) = setup();
    config.run.mode = RunMode::Remote;
    config.client.server_url = "http://127.0.0.1:9".to_owned();

    let (result, events) = run_with_keys(params(8), &config, &[]).await;
    assert!(matches!(result, Err(DistributorError::Remote { .. })));
    assert!(!Path::new(&config.io.out_dir).exists());
    assert_eq!(
        events,
        vec![
            Event::StateChange {
                turn: 0,
                phase: Phase::Executing
            },
            Event::StateChange {
                turn: 0,
                phase: Phase::Quitting
            }
        ]
    );
}
