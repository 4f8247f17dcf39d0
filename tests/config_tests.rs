// tests/config_tests.rs

use std::path::PathBuf;

use log::LevelFilter;
use trace_consumer::config::{self, Config};
use trace_consumer::{Collector, Consumer, RawRecord, TraceController, TraceError, TraceHub, TraceLevel, TraceProvider};
use uuid::Uuid;

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.toml")
}

#[test]
fn shipped_sample_config_loads() {
    let cfg = config::load(&sample_config()).expect("sample config must parse");
    assert!(!cfg.logging.enable);
    assert_eq!(cfg.logging.level_filter(), LevelFilter::Info);
    assert_eq!(cfg.consumer.max_payload_len, Config::default().consumer.max_payload_len);
}

#[test]
fn payload_limit_from_config_rejects_large_replays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.etl");
    let provider_id = Uuid::new_v4();

    let hub = TraceHub::new();
    let mut controller = TraceController::new(&hub);
    controller.start_file_session("BigPayloads", &path).unwrap();
    controller.enable_provider(provider_id, TraceLevel::Verbose, 0).unwrap();
    let mut provider = TraceProvider::new(&hub, provider_id);
    provider.register().unwrap();
    let big = vec![0xAB; 100];
    provider
        .log(&RawRecord::new(Uuid::new_v4(), 1, TraceLevel::Warning).with_payload(&big))
        .unwrap();
    controller.stop().unwrap();

    let cfg = config::loader::parse("[consumer]\nmax_payload_len = 32\n").unwrap();
    let strict = Consumer::with_config(Collector::new(), &cfg.consumer);
    strict.open_file_session(&path).unwrap();
    assert!(matches!(strict.consume(), Err(TraceError::Corrupt(_))));

    let collector = Collector::new();
    let relaxed = Consumer::new(collector.clone());
    relaxed.open_file_session(&path).unwrap();
    relaxed.consume().unwrap();
    assert_eq!(collector.drain()[0].payload, big);
}
