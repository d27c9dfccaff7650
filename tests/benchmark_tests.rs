//! Performance benchmarks for the per-tick synchronization path

use client::config::{InputConfig, InterpolationConfig, ReconciliationConfig};
use client::input::{ControlState, InputSequencer};
use client::interpolation::InterpolationEngine;
use client::latency::LatencyBuffer;
use client::prediction::PredictionEngine;
use client::reconciliation::ReconciliationEngine;
use serde_json::{json, Map};
use shared::codec::{decode, encode, ClientMessage};
use shared::{AuthoritativeSnapshot, ControlFlags, EntityId, EntityKey, Vector2};
use std::time::Instant;

fn state_frame(players: u32, projectiles: u32) -> String {
    let players: Map<String, serde_json::Value> = (0..players)
        .map(|i| {
            (
                i.to_string(),
                json!({"x": i as f32 * 10.0, "y": 100.0, "vx": 1.5, "vy": -2.0, "boost": 100, "seq": i}),
            )
        })
        .collect();
    let projectiles: Vec<serde_json::Value> = (0..projectiles)
        .map(|i| json!({"id": 1000 + i, "x": 5.0, "y": 5.0, "vx": 300.0, "owner": 1}))
        .collect();
    json!({
        "time": 1_700_000_000_000i64,
        "players": players,
        "ball": {"x": 400.0, "y": 300.0, "vx": 10.0, "active": true},
        "projectiles": projectiles,
    })
    .to_string()
}

/// Benchmarks decoding full state updates
#[test]
fn benchmark_state_decode() {
    let frame = state_frame(16, 8);
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _message = decode(&frame).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "State decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks encoding input messages
#[test]
fn benchmark_input_encode() {
    let mut sequencer = InputSequencer::new(InputConfig::default());
    let control = ControlState {
        flags: ControlFlags {
            right: true,
            shoot: true,
            ..Default::default()
        },
        aim: Vector2::new(640.0, 360.0),
    };

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        if let Some(input) = sequencer.observe(&control, i * 100) {
            let _frame = encode(&ClientMessage::Input(input)).unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Input sequencing + encode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(sequencer.next_sequence(), iterations as u32 + 1);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks interpolating a full arena of remote entities
#[test]
fn benchmark_interpolation_render() {
    let mut engine = InterpolationEngine::new(InterpolationConfig::default());
    for id in 0..32u32 {
        for step in 0..10i64 {
            engine.ingest(
                EntityKey::player(EntityId::from(id)),
                AuthoritativeSnapshot {
                    entity_id: EntityId::from(id),
                    position: Vector2::new(step as f32 * 5.0, id as f32),
                    velocity: Vector2::new(300.0, 0.0),
                    server_timestamp: step * 16,
                    aux: Map::new(),
                },
            );
        }
    }
    engine.timestamp_for(Some(0), 0);

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let rendered = engine.render(100 + (i % 100), 1.0 / 60.0);
        assert_eq!(rendered.len(), 32);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: 32 entities × {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks the local prediction and reconciliation step
#[test]
fn benchmark_prediction_reconciliation() {
    let prediction = PredictionEngine::default();
    let reconciliation = ReconciliationEngine::new(ReconciliationConfig::default());
    let flags = ControlFlags {
        up: true,
        right: true,
        ..Default::default()
    };
    let snapshot = AuthoritativeSnapshot {
        entity_id: EntityId::from(1),
        position: Vector2::new(500.0, 200.0),
        velocity: Vector2::ZERO,
        server_timestamp: 0,
        aux: Map::new(),
    };

    let iterations = 1_000_000;
    let mut position = Vector2::new(400.0, 300.0);
    let start = Instant::now();

    for _ in 0..iterations {
        position = prediction.step(position, &flags, 1.0 / 60.0);
        position = reconciliation.reconcile(position, Some(&snapshot));
    }

    let duration = start.elapsed();
    println!(
        "Prediction + reconciliation: {} steps in {:?} ({:.2} ns/step)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(position.x.is_finite() && position.y.is_finite());
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks latency buffer throughput
#[test]
fn benchmark_latency_buffer() {
    let mut buffer = LatencyBuffer::new(100, usize::MAX);
    let iterations = 100_000i64;
    let mut delivered = 0;
    let start = Instant::now();

    for now in 0..iterations {
        buffer.push(now, now);
        delivered += buffer.pop_ready(now).len();
    }
    delivered += buffer.pop_ready(iterations + 100).len();

    let duration = start.elapsed();
    println!(
        "Latency buffer: {} messages in {:?} ({:.2} ns/msg)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(delivered, iterations as usize);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
