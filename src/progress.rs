use std::io::{Read, Write};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Sink for byte-level progress of a single operation at a time.
///
/// Core operations call `start` once per file or download, `advance` as bytes
/// pass through, then `finish`. `total` is `None` when the size is unknown.
pub trait Reporter: Send + Sync {
    fn start(&self, label: &str, total: Option<u64>);
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// Discards all progress.
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

/// Terminal progress bars drawn with indicatif on stderr.
#[derive(Default)]
pub struct BarReporter {
    current: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl Reporter for BarReporter {
    fn start(&self, label: &str, total: Option<u64>) {
        let pb = match total {
            Some(len) => ProgressBar::new(len).with_style(bytes_style()),
            None => ProgressBar::new_spinner().with_style(spinner_style()),
        };
        pb.set_message(label.to_string());
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn advance(&self, bytes: u64) {
        if let Ok(current) = self.current.lock() {
            if let Some(pb) = current.as_ref() {
                pb.inc(bytes);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(pb) = current.take() {
                pb.finish();
            }
        }
    }
}

#[derive(Debug)]
pub enum CopyError {
    Read(std::io::Error),
    Write(std::io::Error),
    Cancelled,
}

/// Copies `reader` into `writer`, feeding every chunk to `reporter` right after
/// it has been written. Checks `cancel` between chunks.
pub fn copy_with_progress<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        reporter.advance(n as u64);
        copied += n as u64;
    }
    writer.flush().map_err(CopyError::Write)?;
    Ok(copied)
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::Reporter;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Start(String, Option<u64>),
        Advance(u64),
        Finish,
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        pub events: Mutex<Vec<Event>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn started_labels(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Start(label, _) => Some(label),
                    _ => None,
                })
                .collect()
        }

        pub fn advanced_bytes(&self) -> u64 {
            self.events()
                .iter()
                .map(|e| match e {
                    Event::Advance(n) => *n,
                    _ => 0,
                })
                .sum()
        }
    }

    impl Reporter for RecordingReporter {
        fn start(&self, label: &str, total: Option<u64>) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Start(label.to_string(), total));
        }

        fn advance(&self, bytes: u64) {
            self.events.lock().unwrap().push(Event::Advance(bytes));
        }

        fn finish(&self) {
            self.events.lock().unwrap().push(Event::Finish);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingReporter;
    use super::*;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn copy_reports_every_byte() {
        let data = vec![7u8; COPY_BUF_SIZE * 2 + 10];
        let mut out = Vec::new();
        let reporter = RecordingReporter::default();

        let n = copy_with_progress(
            &mut data.as_slice(),
            &mut out,
            &reporter,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(reporter.advanced_bytes(), data.len() as u64);
    }

    #[test]
    fn copy_distinguishes_write_failures() {
        let reporter = RecordingReporter::default();
        let result = copy_with_progress(
            &mut &b"payload"[..],
            &mut FailingWriter,
            &reporter,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(CopyError::Write(_))));
        assert_eq!(reporter.advanced_bytes(), 0);
    }

    #[test]
    fn copy_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let result = copy_with_progress(&mut &b"data"[..], &mut out, &NoopReporter, &cancel);
        assert!(matches!(result, Err(CopyError::Cancelled)));
        assert!(out.is_empty());
    }

    #[test]
    fn bar_reporter_handles_zero_and_unknown_totals() {
        let reporter = BarReporter::new();
        reporter.start("empty", Some(0));
        reporter.advance(0);
        reporter.finish();
        reporter.start("unknown", None);
        reporter.advance(1024);
        reporter.finish();
    }
}
