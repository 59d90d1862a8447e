//! Chunked writer for the destination file with coarse progress logging.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Progress step when the total size is unknown.
const UNKNOWN_SIZE_LOG_STEP: u64 = 64 * 1024 * 1024;

/// Writes the response body in pieces of at most `chunk_size` bytes.
pub(crate) struct ChunkSink<W: Write = File> {
    out: W,
    chunk_size: usize,
    written: u64,
    total: Option<u64>,
    next_log_at: u64,
    label: PathBuf,
}

impl<W: Write> ChunkSink<W> {
    pub fn new(out: W, chunk_size: usize, label: PathBuf) -> Self {
        Self {
            out,
            chunk_size: chunk_size.max(1),
            written: 0,
            total: None,
            next_log_at: UNKNOWN_SIZE_LOG_STEP,
            label,
        }
    }

    /// Set the expected body size (from Content-Length) before the first write.
    pub fn expect_total(&mut self, total: Option<u64>) {
        if self.written == 0 && self.total.is_none() {
            self.total = total.filter(|t| *t > 0);
            self.next_log_at = self.step();
        }
    }

    fn step(&self) -> u64 {
        match self.total {
            Some(total) => (total / 10).max(1),
            None => UNKNOWN_SIZE_LOG_STEP,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(self.chunk_size) {
            self.out.write_all(chunk)?;
            self.written += chunk.len() as u64;
        }
        if self.written >= self.next_log_at {
            self.log_progress();
            let step = self.step();
            while self.next_log_at <= self.written {
                self.next_log_at += step;
            }
        }
        Ok(())
    }

    fn log_progress(&self) {
        match self.total {
            Some(total) => tracing::info!(
                "{}: {} / {} bytes ({}%)",
                self.label.display(),
                self.written,
                total,
                self.written.saturating_mul(100) / total
            ),
            None => tracing::info!("{}: {} bytes", self.label.display(), self.written),
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the number of bytes written.
    pub fn finish(mut self) -> io::Result<u64> {
        self.out.flush()?;
        Ok(self.written)
    }
}
