//! Size-based rotating log file, since the stack's `tracing-appender` only
//! offers time-based rotation. The rotation scheme itself — shift
//! `name.N` to `name.N+1`, oldest dropped, current file renamed to `.1` —
//! mirrors the backup-rotation idiom used elsewhere in this codebase for
//! versioned snapshots.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_BACKUPS: u32 = 5;

struct RotatingState {
    path: PathBuf,
    file: File,
    written: u64,
}

pub struct RotatingFileWriter {
    state: Mutex<RotatingState>,
}

impl RotatingFileWriter {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(RotatingFileWriter {
            state: Mutex::new(RotatingState { path, file, written }),
        })
    }

    fn rotate(state: &mut RotatingState) -> io::Result<()> {
        for n in (1..MAX_BACKUPS).rev() {
            let from = backup_path(&state.path, n);
            let to = backup_path(&state.path, n + 1);
            if from.exists() {
                fs::rename(&from, &to)?;
            }
        }
        fs::rename(&state.path, backup_path(&state.path, 1))?;
        state.file = OpenOptions::new().create(true).append(true).open(&state.path)?;
        state.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(format!(".{n}"));
    PathBuf::from(os)
}

impl Write for &RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.state.lock().expect("log rotation mutex poisoned");
        if guard.written >= MAX_BYTES {
            RotatingFileWriter::rotate(&mut guard)?;
        }
        let n = guard.file.write(buf)?;
        guard.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().expect("log rotation mutex poisoned").file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingFileWriter {
    type Writer = &'a RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Installs the global tracing subscriber: stdout plus, when `log_dir` is
/// usable, a size-rotating file layer. Verbosity comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_tracing(log_dir: &Path) {
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    match RotatingFileWriter::open(log_dir.join("cuebridge.log")) {
        Ok(writer) => {
            let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            registry.with(file_layer).init();
        }
        Err(e) => {
            registry.init();
            tracing::warn!(error = %e, "could not open rotating log file, logging to stdout only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_once_max_bytes_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let writer = RotatingFileWriter::open(&path).unwrap();

        {
            let mut state = writer.state.lock().unwrap();
            state.written = MAX_BYTES;
        }

        {
            let mut w: &RotatingFileWriter = &writer;
            w.write_all(b"hello").unwrap();
        }

        assert!(backup_path(&path, 1).exists());
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }
}
