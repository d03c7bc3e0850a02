//! Runtime output files
//!
//! - The log file receives timestamped lifecycle lines
//! - The stdout file receives the startup table of workers

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Appends lifecycle lines to the runtime log file, mirrored to tracing
pub(crate) struct RuntimeLog {
    file: Option<Mutex<File>>,
}

impl RuntimeLog {
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Mutex::new(open_append(path)?)),
            None => None,
        };
        Ok(Self { file })
    }

    pub fn write(&self, message: &str) {
        info!("{}", message);

        let Some(file) = &self.file else {
            return;
        };
        let Ok(mut file) = file.lock() else {
            return;
        };
        let line = format!("{} {}\n", Local::now().format(TIMESTAMP_FORMAT), message);
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("Failed to write runtime log: {}", e);
        }
    }
}

/// One row of the startup table
pub(crate) struct BannerRow<'a> {
    pub worker: &'a str,
    pub listen: &'a str,
    pub status: &'a str,
}

/// Writes the startup table to `path`, or to stdout when unset
pub(crate) fn write_banner(path: Option<&Path>, rows: &[BannerRow<'_>]) -> io::Result<()> {
    let banner = render_banner(rows);
    match path {
        Some(path) => open_append(path)?.write_all(banner.as_bytes()),
        None => {
            print!("{}", banner);
            io::stdout().flush()
        }
    }
}

fn render_banner(rows: &[BannerRow<'_>]) -> String {
    let worker_width = rows
        .iter()
        .map(|row| row.worker.len())
        .chain(["worker".len()])
        .max()
        .unwrap_or(0);
    let listen_width = rows
        .iter()
        .map(|row| row.listen.len())
        .chain(["listen".len()])
        .max()
        .unwrap_or(0);

    let mut banner = format!(
        "Trellis workers started at {}\n",
        Local::now().format(TIMESTAMP_FORMAT)
    );
    banner.push_str(&format!(
        "{:<worker_width$}  {:<listen_width$}  status\n",
        "worker", "listen"
    ));
    for row in rows {
        banner.push_str(&format!(
            "{:<worker_width$}  {:<listen_width$}  {}\n",
            row.worker, row.listen, row.status
        ));
    }
    banner
}
