//! Capture `tracing` output in tests
//!
//! Used to check that tokens and audiences never reach the logs.

use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for formatted log lines.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Everything logged so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Panics if `needle` appears anywhere in the captured output.
    pub fn assert_not_logged(&self, needle: &str) {
        let contents = self.contents();
        assert!(
            !contents.contains(needle),
            "{needle:?} must not appear in logs:\n{contents}"
        );
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route all events at TRACE and above on this thread into a buffer until the
/// returned guard is dropped.
///
/// Pair with `#[tokio::test]` (current-thread runtime) so spawned work runs
/// on the capturing thread.
///
/// # Example
/// ```rust,ignore
/// let (logs, _guard) = capture_logs();
/// cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await;
/// logs.assert_not_logged(TEST_GOOD_TOKEN);
/// ```
#[must_use]
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
