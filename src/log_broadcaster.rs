//! Ordered, thread-safe store of harness log lines.
//!
//! Every line emitted during a run (banners, child stdout, child stderr) is
//! appended here. A single observer may be attached at a time: it first gets
//! the complete history as one batch, then every new line as it arrives.

use log::debug;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Receiver of harness log lines.
pub trait LogObserver: Send + Sync {
    /// Called once on registration with every line appended so far.
    fn on_history(&self, lines: &[String]);

    /// Called for each line appended after registration.
    fn on_line(&self, line: &str);
}

struct Inner {
    history: Vec<String>,
    observer: Option<Weak<dyn LogObserver>>,
}

/// Append-only log with late-subscriber replay.
///
/// The observer is held weakly so a detached UI (or any other observer) is
/// never kept alive by the log.
pub struct LogBroadcaster {
    inner: Mutex<Inner>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                history: Vec::new(),
                observer: None,
            }),
        }
    }

    // A panicking observer must not make the log unusable for everyone else.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `line` and forwards it to the live observer, if any.
    ///
    /// Both steps happen under one lock, so concurrent producers are totally
    /// ordered and an observer never sees a line twice or misses one.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        let mut inner = self.lock();
        if let Some(observer) = inner.observer.as_ref().and_then(Weak::upgrade) {
            observer.on_line(&line);
        }
        inner.history.push(line);
    }

    /// Replays the full history to `observer`, then makes it the live target.
    ///
    /// Any previously registered observer stops receiving lines.
    pub fn register_observer(&self, observer: &Arc<dyn LogObserver>) {
        let mut inner = self.lock();
        debug!(
            "Registering log observer, replaying {} lines",
            inner.history.len()
        );
        observer.on_history(&inner.history);
        inner.observer = Some(Arc::downgrade(observer));
    }

    /// Snapshot of every line appended so far.
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Number of lines appended so far.
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that echoes every line to standard output.
pub struct ConsolePrinter;

impl ConsolePrinter {
    fn print(line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // 标准输出关闭时只能丢弃
        let _ = writeln!(handle, "{line}");
    }
}

impl LogObserver for ConsolePrinter {
    fn on_history(&self, lines: &[String]) {
        for line in lines {
            Self::print(line);
        }
    }

    fn on_line(&self, line: &str) {
        Self::print(line);
    }
}

/// Observer that keeps its own copy of what it received.
///
/// History batches and live lines are recorded separately so callers can
/// tell replayed lines from live ones.
#[derive(Default)]
pub struct LogCollector {
    received: Mutex<Received>,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct Received {
    pub history_batches: Vec<Vec<String>>,
    pub live: Vec<String>,
}

impl LogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Received {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replayed history followed by live lines.
    pub fn all_lines(&self) -> Vec<String> {
        let received = self.received();
        received
            .history_batches
            .into_iter()
            .flatten()
            .chain(received.live)
            .collect()
    }
}

impl LogObserver for LogCollector {
    fn on_history(&self, lines: &[String]) {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .history_batches
            .push(lines.to_vec());
    }

    fn on_line(&self, line: &str) {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .live
            .push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn collector() -> (Arc<LogCollector>, Arc<dyn LogObserver>) {
        let collector = Arc::new(LogCollector::new());
        let observer: Arc<dyn LogObserver> = collector.clone();
        (collector, observer)
    }

    #[test]
    fn test_history_replayed_as_single_batch() {
        let log = LogBroadcaster::new();
        log.append("one");
        log.append("two");

        let (collector, observer) = collector();
        log.register_observer(&observer);
        log.append("three");

        let received = collector.received();
        assert_eq!(received.history_batches, vec![vec!["one", "two"]]);
        assert_eq!(received.live, vec!["three"]);
        assert_eq!(log.history(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_replacing_observer_stops_first_and_replays_all_to_second() {
        let log = LogBroadcaster::new();
        log.append("before-first");

        let (first, first_observer) = collector();
        log.register_observer(&first_observer);
        log.append("after-first");

        let (second, second_observer) = collector();
        log.register_observer(&second_observer);
        log.append("after-second");

        assert_eq!(first.all_lines(), vec!["before-first", "after-first"]);
        assert_eq!(
            second.received().history_batches,
            vec![vec!["before-first", "after-first"]]
        );
        assert_eq!(second.received().live, vec!["after-second"]);
    }

    #[test]
    fn test_dropped_observer_is_silently_ignored() {
        let log = LogBroadcaster::new();
        {
            let (_collector, observer) = collector();
            log.register_observer(&observer);
        }
        log.append("nobody listening");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_concurrent_append_during_registration_has_no_gaps_or_duplicates() {
        let log = Arc::new(LogBroadcaster::new());
        for i in 0..100 {
            log.append(format!("early {i}"));
        }

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        log.append(format!("p{p} {i}"));
                    }
                })
            })
            .collect();

        let (collector, observer) = collector();
        log.register_observer(&observer);

        for producer in producers {
            producer.join().unwrap();
        }

        // history + live must reconstruct the full log exactly once, in order
        assert_eq!(collector.all_lines(), log.history());
        assert_eq!(log.len(), 100 + 4 * 250);
        assert_eq!(collector.received().history_batches.len(), 1);
    }

    #[test]
    fn test_per_producer_order_preserved() {
        let log = Arc::new(LogBroadcaster::new());
        let handles: Vec<_> = (0..3)
            .map(|p| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        log.append(format!("{p}:{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for p in 0..3 {
            let prefix = format!("{p}:");
            let seq: Vec<usize> = log
                .history()
                .iter()
                .filter_map(|l| l.strip_prefix(&prefix).map(|n| n.parse().unwrap()))
                .collect();
            assert_eq!(seq, (0..100).collect::<Vec<_>>());
        }
    }
}
