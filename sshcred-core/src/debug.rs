//! Optional debug sink.
//!
//! Diagnostics from key loading are always emitted as `tracing` events.  An
//! application that does not install a `tracing` subscriber can still see them
//! by registering a [`DebugSink`], either per key
//! ([`KeyPair::with_debug`](crate::KeyPair::with_debug)) or process-wide with
//! [`set_debug`].  No sink is installed by default.
//!
//! The process-wide sink sits behind an `RwLock`: emitting only takes the read
//! lock, so concurrent loads never serialize on it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Receives formatted diagnostic lines.  Implementations must be thread-safe.
pub trait DebugSink: Send + Sync {
    fn print(&self, message: &str);
}

impl<F> DebugSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn print(&self, message: &str) {
        self(message)
    }
}

/// Writes each diagnostic to stderr with a fixed prefix.
#[derive(Debug, Clone)]
pub struct StderrSink {
    prefix: String,
}

impl StderrSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl DebugSink for StderrSink {
    fn print(&self, message: &str) {
        eprintln!("{}{message}", self.prefix);
    }
}

static GLOBAL_SINK: RwLock<Option<Arc<dyn DebugSink>>> = RwLock::new(None);

/// Install `sink` as the process-wide debug sink, replacing any previous one.
pub fn set_debug(sink: impl DebugSink + 'static) {
    set_debug_arc(Arc::new(sink));
}

pub fn set_debug_arc(sink: Arc<dyn DebugSink>) {
    *GLOBAL_SINK.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
}

/// Remove the process-wide debug sink.
pub fn clear_debug() {
    *GLOBAL_SINK.write().unwrap_or_else(PoisonError::into_inner) = None;
}

fn global_sink() -> Option<Arc<dyn DebugSink>> {
    GLOBAL_SINK
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Emit a diagnostic to `sink` if given, else to the process-wide sink.
///
/// The lock is released before the sink runs, so a sink may itself call
/// [`set_debug`] without deadlocking.
pub(crate) fn emit(sink: Option<&Arc<dyn DebugSink>>, args: fmt::Arguments<'_>) {
    let message = args.to_string();
    tracing::debug!(target: "sshcred::debug", "{message}");

    match sink {
        Some(sink) => sink.print(&message),
        None => {
            if let Some(sink) = global_sink() {
                sink.print(&message);
            }
        }
    }
}

/// `format!`-style diagnostic through [`emit`].
macro_rules! debug_log {
    ($sink:expr, $($arg:tt)*) => {
        $crate::debug::emit($sink, format_args!($($arg)*))
    };
}
pub(crate) use debug_log;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use super::*;

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl DebugSink + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        (lines, move |msg: &str| sink_lines.lock().unwrap().push(msg.to_string()))
    }

    #[test]
    fn no_sink_is_a_noop() {
        let _guard = crate::TEST_GLOBAL_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        clear_debug();
        debug_log!(None, "nobody listens {}", 42);
    }

    #[test]
    fn global_sink_receives_formatted_messages() {
        let _guard = crate::TEST_GLOBAL_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let (lines, sink) = collector();
        set_debug(sink);

        debug_log!(None, "fizz {}", "buzz");
        debug_log!(None, "bar");
        clear_debug();
        debug_log!(None, "after clear");

        assert_eq!(*lines.lock().unwrap(), vec!["fizz buzz", "bar"]);
    }

    #[test]
    fn explicit_sink_takes_precedence() {
        let _guard = crate::TEST_GLOBAL_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let (global_lines, global) = collector();
        let (local_lines, local) = collector();
        set_debug(global);
        let local: Arc<dyn DebugSink> = Arc::new(local);

        debug_log!(Some(&local), "local only");
        clear_debug();

        assert_eq!(*local_lines.lock().unwrap(), vec!["local only"]);
        assert!(global_lines.lock().unwrap().is_empty());
    }

    #[test]
    fn concurrent_set_and_emit() {
        let _guard = crate::TEST_GLOBAL_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let (lines, sink) = collector();
        let sink: Arc<dyn DebugSink> = Arc::new(sink);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    set_debug_arc(sink);
                    debug_log!(None, "thread {i}");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        clear_debug();

        assert_eq!(lines.lock().unwrap().len(), 8);
    }
}
