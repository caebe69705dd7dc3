//! Diagnostic reporting.
//!
//! The demultiplexer never writes to the console or to a global logger itself.  Instead every
//! diagnostic is handed to a [`LogSink`](trait.LogSink.html) supplied by the application when the
//! [`Demultiplex`](../demultiplex/struct.Demultiplex.html) is created.  Messages below the
//! configured [`Severity`](enum.Severity.html) threshold are discarded before the sink is called
//! (and before the message is formatted).
//!
//! [`LogCrateSink`](struct.LogCrateSink.html) forwards messages onto the `log` crate facade, for
//! applications which already have a logger installed.

use std::fmt;

/// How important a diagnostic message is.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum Severity {
    /// Per-packet tracing, only useful when investigating a particular stream.
    Debug,
    /// Progress through the stream, such as tables found and synchronisation gained.
    Info,
    /// Data was lost or dropped, but demultiplexing continues.
    Warning,
    /// The stream could not be processed further.
    Error,
}

impl Severity {
    /// short lowercase name, as used in console output
    pub fn name(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl From<Severity> for log::Level {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability for receiving diagnostic messages from the demultiplexer.
pub trait LogSink {
    /// Called for each message at or above the configured threshold.
    fn log(&mut self, severity: Severity, message: fmt::Arguments<'_>);
}

impl<L: LogSink + ?Sized> LogSink for &mut L {
    fn log(&mut self, severity: Severity, message: fmt::Arguments<'_>) {
        (**self).log(severity, message)
    }
}

/// A `LogSink` that forwards every message to the `log` crate, under the target `"ts2es"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&mut self, severity: Severity, message: fmt::Arguments<'_>) {
        log::log!(target: "ts2es", log::Level::from(severity), "{}", message);
    }
}

/// A `LogSink` that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&mut self, _severity: Severity, _message: fmt::Arguments<'_>) {}
}

/// Wraps the application's `LogSink`, applying the severity threshold and keeping track of the
/// stream position that messages refer to.
pub(crate) struct Reporter<L> {
    sink: L,
    threshold: Severity,
    offset: u64,
    frame_info_reported: bool,
}

impl<L: LogSink> Reporter<L> {
    pub fn new(sink: L, threshold: Severity) -> Reporter<L> {
        Reporter {
            sink,
            threshold,
            offset: 0,
            frame_info_reported: false,
        }
    }

    #[inline]
    pub fn log(&mut self, severity: Severity, message: fmt::Arguments<'_>) {
        if severity >= self.threshold {
            self.sink.log(severity, message);
        }
    }

    /// byte offset within the input of the packet currently being processed
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Returns `true` only the first time it is called; used so that the details of the first
    /// audio frame header are described once per demultiplexer.
    pub fn first_frame_info(&mut self) -> bool {
        !std::mem::replace(&mut self.frame_info_reported, true)
    }

    pub fn sink(&self) -> &L {
        &self.sink
    }

    pub fn into_sink(self) -> L {
        self.sink
    }
}

/// `report!(reporter, Warning, "format {}", args)`
macro_rules! report {
    ($r:expr, $sev:ident, $($arg:tt)+) => {
        $r.log($crate::report::Severity::$sev, format_args!($($arg)+))
    };
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Records every message it is given, for assertions in tests.
    #[derive(Default, Debug)]
    pub struct RecordingLogSink {
        pub messages: Vec<(Severity, String)>,
    }
    impl RecordingLogSink {
        pub fn count(&self, severity: Severity) -> usize {
            self.messages.iter().filter(|(s, _)| *s == severity).count()
        }
        pub fn contains(&self, severity: Severity, text: &str) -> bool {
            self.messages
                .iter()
                .any(|(s, m)| *s == severity && m.contains(text))
        }
    }
    impl LogSink for RecordingLogSink {
        fn log(&mut self, severity: Severity, message: fmt::Arguments<'_>) {
            self.messages.push((severity, message.to_string()));
        }
    }

    #[test]
    fn threshold_filters() {
        let mut r = Reporter::new(RecordingLogSink::default(), Severity::Warning);
        report!(r, Debug, "dropped {}", 1);
        report!(r, Info, "dropped {}", 2);
        report!(r, Warning, "kept {}", 3);
        report!(r, Error, "kept {}", 4);
        let sink = r.into_sink();
        assert_eq!(
            sink.messages,
            vec![
                (Severity::Warning, "kept 3".to_string()),
                (Severity::Error, "kept 4".to_string()),
            ]
        );
    }

    #[test]
    fn first_frame_info_once() {
        let mut r = Reporter::new(NullLogSink, Severity::Debug);
        assert!(r.first_frame_info());
        assert!(!r.first_frame_info());
    }

    #[test]
    fn severity_order() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(log::Level::Warn, log::Level::from(Severity::Warning));
        assert_eq!("warning", Severity::Warning.to_string());
    }
}
