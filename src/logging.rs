// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logging: an `OffsetTime`-stamped `FmtSubscriber` switched
//! between `INFO` and `DEBUG`. A [`Tee`] writer fans every event out to
//! both stdout and a `log` file in the working directory, instead of
//! standing up two subscribers.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt;

/// A writer that duplicates every write to stdout and to an open log file.
/// Cloning shares the underlying file handle, which is what
/// `tracing_subscriber`'s `MakeWriter` contract requires per-event.
#[derive(Clone)]
struct Tee {
    file: Arc<Mutex<File>>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.lock().expect("log file mutex poisoned").write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.lock().expect("log file mutex poisoned").flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for Tee {
    type Writer = Tee;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs the global `tracing` subscriber, logging to both stdout and
/// `{directory}/log`. `debug` raises the level from `INFO` to `DEBUG`.
pub fn initialize(directory: &Path, debug: bool) -> io::Result<()> {
    let timer = time::format_description::parse("[hour]:[minute]:[second]")
        .expect("could not create time format description");
    let time_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = fmt::time::OffsetTime::new(time_offset, timer);

    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(directory.join("log"))?;
    let writer = Tee { file: Arc::new(Mutex::new(file)) };

    let subscriber = fmt::Subscriber::builder()
        .with_max_level(level)
        .with_thread_ids(true)
        .with_timer(timer)
        .with_ansi(true)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default log subscriber failed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_writes_reach_the_log_file() {
        let dir = std::env::temp_dir().join("linebreak-agent-logging-test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("log"))
            .unwrap();
        let mut tee = Tee { file: Arc::new(Mutex::new(file)) };
        tee.write_all(b"hello\n").unwrap();
        tee.flush().unwrap();

        let contents = std::fs::read_to_string(dir.join("log")).unwrap();
        assert_eq!(contents, "hello\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
