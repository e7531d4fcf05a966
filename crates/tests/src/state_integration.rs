//! Integration tests for parameter state persistence
//!
//! State written by one processor must restore into another, and malformed
//! or foreign state must never half-apply.

use dualpeak_core::domain::params::{ParamId, ParameterSet, StateError};
use dualpeak_core::domain::processor::Processor;
use dualpeak_core::domain::settings::ChainSettings;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn tweaked_settings() -> ChainSettings {
    ChainSettings {
        peak1_freq: 740.0,
        peak1_gain_db: -7.5,
        peak1_quality: 2.5,
        span: 1.25,
        balance: 3.0,
        output_gain_db: -4.0,
    }
}

#[test]
fn test_state_moves_between_processors() {
    let source = Arc::new(ParameterSet::new());
    source.apply(&tweaked_settings());
    let bytes = Processor::new(Arc::clone(&source)).get_state().unwrap();

    let target = Arc::new(ParameterSet::new());
    let processor = Processor::new(Arc::clone(&target));
    processor.set_state(&bytes);

    assert_eq!(ChainSettings::from_parameters(&target), tweaked_settings());
}

#[test]
fn test_state_is_readable_json() {
    let params = ParameterSet::new();
    params.set(ParamId::Span, 2.0);

    let bytes = params.save_state().unwrap();
    let tree: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(tree["type"], "Parameters");
    assert_eq!(tree["version"], 1);
    let entries = tree["params"].as_array().unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries
        .iter()
        .any(|e| e["id"] == "Span" && e["value"].as_f64() == Some(2.0)));
}

#[test]
fn test_hand_written_state_restores_known_ids() {
    let params = ParameterSet::new();
    params.set(ParamId::OutputGain, -20.0);

    let state = br#"{
        "type": "Parameters",
        "version": 1,
        "params": [
            { "id": "Peak1 Freq", "value": 1500.0 },
            { "id": "Peak2 Freq", "value": 9000.0 },
            { "id": "Balance", "value": 40.0 }
        ]
    }"#;
    params.load_state(state).unwrap();

    assert_eq!(params.value(ParamId::Peak1Freq), 1500.0);
    // Out-of-range values clamp
    assert_eq!(params.value(ParamId::Balance), 12.0);
    // Missing ids fall back to defaults
    assert_eq!(params.value(ParamId::OutputGain), 0.0);
    assert_eq!(params.value(ParamId::Peak1Quality), 1.0);
}

#[test]
fn test_rejected_state_changes_nothing() {
    let params = ParameterSet::new();
    params.apply(&tweaked_settings());

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    params.add_listener(Arc::new(move |_: ParamId, _: f32| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let cases: [&[u8]; 4] = [
        b"",
        b"{\"type\":\"Parameters\",\"version\":1,\"params\":[{\"id\":\"Span\"}]}",
        b"{\"type\":\"Parameters\",\"version\":7,\"params\":[]}",
        b"{\"type\":\"Presets\",\"version\":1,\"params\":[]}",
    ];

    assert!(matches!(params.load_state(cases[0]), Err(StateError::Decode(_))));
    assert!(matches!(params.load_state(cases[1]), Err(StateError::Decode(_))));
    assert!(matches!(
        params.load_state(cases[2]),
        Err(StateError::UnsupportedVersion(7))
    ));
    assert!(matches!(
        params.load_state(cases[3]),
        Err(StateError::UnexpectedType(t)) if t == "Presets"
    ));

    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(ChainSettings::from_parameters(&params), tweaked_settings());
}

#[test]
fn test_processor_ignores_garbage_state() {
    let params = Arc::new(ParameterSet::new());
    params.apply(&tweaked_settings());
    let processor = Processor::new(Arc::clone(&params));

    processor.set_state(b"\x00\x01 not a tree");
    assert_eq!(ChainSettings::from_parameters(&params), tweaked_settings());
}

#[tokio::test]
async fn test_state_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let params = ParameterSet::new();
    params.apply(&tweaked_settings());
    tokio::fs::write(&path, params.save_state().unwrap()).await.unwrap();

    let restored = ParameterSet::new();
    restored
        .load_state(&tokio::fs::read(&path).await.unwrap())
        .unwrap();
    assert_eq!(
        ChainSettings::from_parameters(&restored),
        ChainSettings::from_parameters(&params)
    );
}
