// src/main.rs

//! `trace-dump`: replay a recorded session file and print every record.
//!
//! 1. Load the optional TOML config and set up logging
//! 2. Replay the file through a `Consumer` into a `Collector`
//! 3. Print each record as one JSON line on stdout; logs go to stderr
//!
//! Usage: `trace-dump <file> [config.toml]`

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result, bail};
use log::Level;

use trace_consumer::config::{self, Config};
use trace_consumer::{Collector, Consumer, logging, trace_log};

fn main() {
    if let Err(e) = run() {
        eprintln!(
            "[{}][ERROR][trace-dump] {:#}",
            chrono::Local::now().to_rfc3339(),
            e
        );
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args_os().skip(1).map(PathBuf::from);
    let Some(file) = args.next() else {
        bail!("usage: trace-dump <file> [config.toml]");
    };
    let cfg_path = args.next();

    let cfg = match &cfg_path {
        Some(path) => config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let base_dir = cfg_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    // stdout carries the JSON lines only.
    logging::setup_logging(&cfg.logging, &base_dir, io::stderr()).context("setting up logging")?;

    let collector = Collector::new();
    let consumer = Consumer::with_config(collector.clone(), &cfg.consumer);
    consumer
        .open_file_session(&file)
        .with_context(|| format!("opening {}", file.display()))?;
    consumer
        .consume()
        .with_context(|| format!("replaying {}", file.display()))?;
    consumer.close();

    let records = collector.drain();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        serde_json::to_writer(&mut out, record).context("encoding record")?;
        out.write_all(b"\n").context("writing to stdout")?;
    }
    out.flush().context("writing to stdout")?;

    trace_log!(Level::Info, "trace-dump", "Dumped {} record(s) from {}", records.len(), file.display());
    Ok(())
}
