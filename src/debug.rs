//! Diagnostic topic/data logger
//!
//! A `DebugLogger` is built explicitly from [`DebugConfig`] and owned by
//! whoever built it, usually a session. Each entry is one line:
//!
//! ```text
//! 2026-10-18 09:14:03.512,[INFO],[ip-dist:session/mod.rs:412],IpInEvent,pong
//! ```
//!
//! The bracketed parts follow `show_level`, `show_thread`, `show_module`
//! (caller file) and `show_method` (caller line). Entries go to a log file
//! and, with `console_output`, through the `log` facade under the logger's
//! name as target.

use crate::config::DebugConfig;
use crate::error::Result;
use log::LevelFilter;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};

/// Directory used when `file_name` has no directory part
const DEFAULT_LOG_DIR: &str = "logs";

/// File-backed topic/data logger
pub struct DebugLogger {
    name: String,
    path: PathBuf,
    level: LevelFilter,
    config: DebugConfig,
    file: Mutex<BufWriter<File>>,
}

impl DebugLogger {
    /// Open the log file named by `config.file_name`, or `default_name`
    pub fn new(default_name: &str, config: &DebugConfig) -> Result<Self> {
        let level = config.level_filter()?;
        let requested = config.file_name.as_deref().unwrap_or(default_name);
        let path = log_path(requested, config.date_filename);
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| default_name.to_string());

        log::debug!("Debug log for {} at {}", name, path.display());

        Ok(Self {
            name,
            path,
            level,
            config: config.clone(),
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Logger name (file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `topic,data`
    #[track_caller]
    pub fn write(&self, topic: &str, data: &str) {
        if log::Level::Info > self.level {
            return;
        }
        let line = self.format_entry(Location::caller(), topic, data);

        {
            let mut file = self.file.lock();
            if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
                log::warn!("Debug log write to {} failed: {}", self.path.display(), e);
            }
        }

        if self.config.console_output {
            log::info!(target: self.name.as_str(), "{}", line);
        }
    }

    fn format_entry(&self, caller: &Location<'_>, topic: &str, data: &str) -> String {
        let mut line = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f,")
            .to_string();
        if self.config.show_level {
            line.push_str("[INFO],");
        }
        let mut origin = Vec::new();
        if self.config.show_thread {
            origin.push(
                std::thread::current()
                    .name()
                    .unwrap_or("unnamed")
                    .to_string(),
            );
        }
        if self.config.show_module {
            origin.push(caller.file().to_string());
        }
        if self.config.show_method {
            origin.push(caller.line().to_string());
        }
        if !origin.is_empty() {
            line.push('[');
            line.push_str(&origin.join(":"));
            line.push_str("],");
        }
        line.push_str(topic);
        line.push(',');
        line.push_str(data);
        line
    }
}

impl fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugLogger")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("level", &self.level)
            .finish()
    }
}

/// Build the log file path for `requested`
///
/// Adds `.log` when there is no extension, `./logs/` when there is no
/// directory, and `_YYYYmmddHHMMSS` before the extension when `dated`.
fn log_path(requested: &str, dated: bool) -> PathBuf {
    let requested = Path::new(requested);
    let dir = match requested.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from(DEFAULT_LOG_DIR),
    };
    let stem = requested
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "setu".to_string());
    let ext = requested
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    let file = if dated {
        format!("{}{}.{}", stem, chrono::Local::now().format("_%Y%m%d%H%M%S"), ext)
    } else {
        format!("{}.{}", stem, ext)
    };
    dir.join(file)
}
