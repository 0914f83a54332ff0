//! # Scan Reader
//!
//! Drives a [`ScanAssembler`] from a live [`KeySource`].
//!
//! ```text
//! read_scan(timeout)
//!   │
//!   ├─ wait until min(overall deadline, gap deadline)
//!   │     event  ──► assembler.feed_at ──► scan? return it
//!   │     gap    ──► assembler.poll_gap ──► return it
//!   │     overall──► partial input? (flush_partial_on_timeout) return it
//!   │                                          else None
//!   └─ device error ──► reset buffer, Err
//! ```
//!
//! The assembler works on `std::time::Instant`; tokio instants are converted
//! at this boundary so paused-clock tests drive the gap logic too.

use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use farmlink_core::{CompletionPolicy, ScanAssembler, ScanResult};

use crate::error::DeviceResult;
use crate::input::KeySource;

pub struct ScanReader<S: KeySource> {
    source: S,
    assembler: ScanAssembler,
    flush_partial_on_timeout: bool,
}

impl<S: KeySource> ScanReader<S> {
    pub fn new(source: S, policy: CompletionPolicy, flush_partial_on_timeout: bool) -> Self {
        ScanReader {
            source,
            assembler: ScanAssembler::new(policy),
            flush_partial_on_timeout,
        }
    }

    pub fn path(&self) -> &str {
        self.source.path()
    }

    /// Waits for one completed scan.
    ///
    /// Returns `Ok(None)` when `timeout` elapses with nothing to deliver.
    /// With no timeout, waits until a scan completes or the device fails.
    pub async fn read_scan(&mut self, timeout: Option<Duration>) -> DeviceResult<Option<ScanResult>> {
        let overall = timeout.map(|t| Instant::now() + t);

        loop {
            let gap = self.assembler.gap_deadline().map(Instant::from_std);
            let wake = match (overall, gap) {
                (Some(o), Some(g)) => Some(o.min(g)),
                (o, g) => o.or(g),
            };

            let next = match wake {
                Some(at) => timeout_at(at, self.source.next_event()).await.ok(),
                None => Some(self.source.next_event().await),
            };

            match next {
                Some(Ok(event)) => {
                    let now = Instant::now().into_std();
                    if let Some(scan) = self.assembler.feed_at(event, now) {
                        return Ok(Some(scan));
                    }
                }
                Some(Err(e)) => {
                    self.assembler.reset();
                    return Err(e);
                }
                None => {
                    let now = Instant::now();
                    if let Some(scan) = self.assembler.poll_gap(now.into_std()) {
                        return Ok(Some(scan));
                    }
                    if overall.is_some_and(|o| now >= o) {
                        return Ok(self.on_overall_timeout());
                    }
                }
            }
        }
    }

    fn on_overall_timeout(&mut self) -> Option<ScanResult> {
        if self.assembler.is_empty() {
            return None;
        }

        if self.flush_partial_on_timeout {
            let partial = self.assembler.take_partial();
            if let Some(scan) = &partial {
                warn!(barcode = %scan.text, "Read timed out mid-scan, delivering possibly truncated barcode");
            }
            partial
        } else {
            debug!(buffered = self.assembler.buffered().len(), "Read timed out mid-scan, keeping partial input");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use async_trait::async_trait;
    use farmlink_core::keymap::KEY_ENTER;
    use farmlink_core::{KeyEvent, ScanCompletion};
    use std::collections::VecDeque;

    const KEY_1: u16 = 2;
    const KEY_2: u16 = 3;
    const KEY_3: u16 = 4;

    /// Replays events, each after its own delay. `None` is a device failure.
    struct ScriptedSource {
        script: VecDeque<(Duration, Option<KeyEvent>)>,
        pending_until: Option<Instant>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(u64, Option<KeyEvent>)>) -> Self {
            ScriptedSource {
                script: script
                    .into_iter()
                    .map(|(ms, e)| (Duration::from_millis(ms), e))
                    .collect(),
                pending_until: None,
            }
        }
    }

    #[async_trait]
    impl KeySource for ScriptedSource {
        async fn next_event(&mut self) -> DeviceResult<KeyEvent> {
            let Some((delay, event)) = self.script.front().cloned() else {
                std::future::pending::<()>().await;
                unreachable!();
            };

            // Delay survives cancellation so timing is not reset by timeouts
            let until = *self.pending_until.get_or_insert(Instant::now() + delay);
            tokio::time::sleep_until(until).await;

            self.pending_until = None;
            self.script.pop_front();
            event.ok_or(DeviceError::Disconnected)
        }

        fn path(&self) -> &str {
            "/dev/input/event-test"
        }
    }

    fn press(code: u16) -> Option<KeyEvent> {
        Some(KeyEvent::press(code))
    }

    fn release(code: u16) -> Option<KeyEvent> {
        Some(KeyEvent::release(code))
    }

    fn gap_policy() -> CompletionPolicy {
        CompletionPolicy::terminator_or_gap(Duration::from_millis(300)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_scan() {
        let source = ScriptedSource::new(vec![
            (10, press(KEY_1)),
            (0, release(KEY_1)),
            (10, press(KEY_2)),
            (10, press(KEY_ENTER)),
        ]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);

        let scan = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap().unwrap();

        assert_eq!(scan.text, "12");
        assert_eq!(scan.completion, ScanCompletion::Terminator);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_completes_without_terminator() {
        let source = ScriptedSource::new(vec![
            (10, press(KEY_1)),
            (20, press(KEY_2)),
            (20, press(KEY_3)),
        ]);
        let mut reader = ScanReader::new(source, gap_policy(), true);
        let start = Instant::now();

        let scan = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap().unwrap();

        assert_eq!(scan.text, "123");
        assert_eq!(scan.completion, ScanCompletion::Gap);
        // Last char at 50 ms, gap of 300 ms
        assert_eq!(start.elapsed(), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_typing_under_gap_stays_one_scan() {
        let source = ScriptedSource::new(vec![
            (10, press(KEY_1)),
            (250, press(KEY_2)),
            (250, press(KEY_3)),
            (250, press(KEY_ENTER)),
        ]);
        let mut reader = ScanReader::new(source, gap_policy(), true);

        let scan = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap().unwrap();

        assert_eq!(scan.text, "123");
        assert_eq!(scan.completion, ScanCompletion::Terminator);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_nothing_buffered() {
        let source = ScriptedSource::new(vec![]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);

        let scan = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap();
        assert!(scan.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_flushes_partial() {
        let source = ScriptedSource::new(vec![(10, press(KEY_1)), (10, press(KEY_2))]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);

        let scan = reader.read_scan(Some(Duration::from_secs(1))).await.unwrap().unwrap();

        assert_eq!(scan.text, "12");
        assert_eq!(scan.completion, ScanCompletion::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_partial_when_disabled() {
        let source = ScriptedSource::new(vec![
            (10, press(KEY_1)),
            (10, press(KEY_2)),
            (2000, press(KEY_ENTER)),
        ]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, false);

        assert!(reader.read_scan(Some(Duration::from_secs(1))).await.unwrap().is_none());

        // The next read picks up where the first left off
        let scan = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap().unwrap();
        assert_eq!(scan.text, "12");
        assert_eq!(scan.completion, ScanCompletion::Terminator);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_resets_buffer() {
        let source = ScriptedSource::new(vec![(10, press(KEY_1)), (10, None)]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);

        let err = reader.read_scan(Some(Duration::from_secs(5))).await.unwrap_err();

        assert!(matches!(err, DeviceError::Disconnected));
        assert!(reader.assembler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_scans() {
        let source = ScriptedSource::new(vec![
            (10, press(KEY_1)),
            (10, press(KEY_ENTER)),
            (10, press(KEY_2)),
            (10, press(KEY_ENTER)),
        ]);
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);

        let first = reader.read_scan(None).await.unwrap().unwrap();
        let second = reader.read_scan(None).await.unwrap().unwrap();

        assert_eq!(first.text, "1");
        assert_eq!(second.text, "2");
    }
}
