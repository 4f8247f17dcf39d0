// src/logging.rs

//! fern log dispatch for binaries and tests that want console/file output.

use std::{path::Path, process, thread};

use chrono::Local;
use fern::Dispatch;

use crate::config::LoggingConfig;

/// Build the dispatch described by `cfg` without installing it.
///
/// Lines go to `console`; when `cfg.enable` is set and a file is named they
/// are also appended to that file (relative paths resolve against `base_dir`).
pub fn build_dispatch(
    cfg: &LoggingConfig,
    base_dir: &Path,
    console: impl Into<fern::Output>,
) -> Result<Dispatch, fern::InitError> {
    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(cfg.level_filter())
        .chain(console);

    if cfg.enable {
        if let Some(file) = &cfg.file {
            dispatch = dispatch.chain(fern::log_file(base_dir.join(file))?);
        }
    }
    Ok(dispatch)
}

/// Install the global logger. Fails if one is already installed.
pub fn setup_logging(
    cfg: &LoggingConfig,
    base_dir: &Path,
    console: impl Into<fern::Output>,
) -> Result<(), fern::InitError> {
    build_dispatch(cfg, base_dir, console)?.apply()?;
    Ok(())
}
