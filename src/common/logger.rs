use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    prelude::*,
};

use crate::configs::LoggingConfig;

/// Builds the filter directive from the configured level and extra filters.
pub fn filter_directive(logging: Option<&LoggingConfig>) -> String {
    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    match logging.and_then(|l| l.filters.as_deref()) {
        Some(filters) if !filters.is_empty() => format!("{},{}", level, filters),
        _ => level.to_string(),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(logging: Option<&LoggingConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(logging)));

    let stdout_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_line_number(true)
        .with_file(false);

    let file_layer = logging.and_then(|l| l.file.as_ref()).map(|file| {
        if let Some(parent) = Path::new(&file.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {}", e);
            }
        }
        fmt::layer()
            .with_writer(CappedFileWriter::new(&file.path, file.max_lines))
            .with_timer(LocalTime::rfc_3339())
            .with_target(true)
            .with_line_number(true)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Append-only log file trimmed back to its newest `max_lines` lines every
/// time roughly a tenth of the cap has been written.
#[derive(Clone)]
pub(crate) struct CappedFileWriter {
    path: PathBuf,
    max_lines: usize,
    written: Arc<Mutex<usize>>,
}

impl CappedFileWriter {
    pub(crate) fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1) as usize,
            written: Arc::new(Mutex::new(0)),
        }
    }

    fn trim(&self) -> io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let lines = BufReader::new(File::open(&self.path)?)
            .lines()
            .collect::<io::Result<Vec<_>>>()?;
        if lines.len() <= self.max_lines {
            return Ok(());
        }
        let mut file = File::create(&self.path)?;
        for line in &lines[lines.len() - self.max_lines..] {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

impl io::Write for CappedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(buf)?;

        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        *written += buf.iter().filter(|&&b| b == b'\n').count();
        if *written >= (self.max_lines / 10).max(50) {
            if let Err(e) = self.trim() {
                eprintln!("Failed to trim log file: {}", e);
            }
            *written = 0;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> fmt::MakeWriter<'a> for CappedFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
