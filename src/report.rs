//! Line protocol consumed by the controlling process.
//!
//! Every event is one line on the wrapped writer, flushed immediately:
//!
//! - `PROGRESS:<0-100>` percent complete
//! - `STAGE:<text>` human-readable phase label
//!
//! Any other line is free-form diagnostic text. Free-form lines that would
//! start with a reserved prefix are escaped so the host never misreads them.

use std::fmt;
use std::io::{self, Stdout, Write};

/// Prefix of progress lines.
pub const PROGRESS_PREFIX: &str = "PROGRESS:";

/// Prefix of stage lines.
pub const STAGE_PREFIX: &str = "STAGE:";

/// A single event streamed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Percent complete, `0..=100`.
    Progress(u8),
    /// Phase label.
    Stage(String),
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(pct) => write!(f, "{PROGRESS_PREFIX}{pct}"),
            Self::Stage(label) => write!(f, "{STAGE_PREFIX}{}", label.replace('\n', " ")),
        }
    }
}

/// Whether `line` starts with a reserved protocol prefix.
#[must_use]
pub fn is_reserved(line: &str) -> bool {
    line.starts_with(PROGRESS_PREFIX) || line.starts_with(STAGE_PREFIX)
}

/// Percent of `done` out of `total`, floored and capped at 99.
///
/// Returns `None` when the total is unknown (zero). 100 is reserved for
/// [`Reporter::finish`].
#[must_use]
pub fn percent_of(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (u128::from(done) * 100 / u128::from(total)).min(99);
    u8::try_from(pct).ok()
}

/// Always-flushed writer for the stdout protocol.
///
/// Progress is kept monotonic: a value lower than or equal to the last one
/// emitted is dropped, and `100` is written at most once.
#[derive(Debug)]
pub struct Reporter<W: Write = Stdout> {
    out: W,
    last_percent: Option<u8>,
    finished: bool,
}

impl Reporter<Stdout> {
    /// Reporter writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    /// Wrap a writer.
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_percent: None,
            finished: false,
        }
    }

    /// Emit a progress value below 100. Values that would move backwards are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn progress(&mut self, percent: u8) -> io::Result<()> {
        let percent = percent.min(99);
        if self.finished || self.last_percent.is_some_and(|last| percent <= last) {
            return Ok(());
        }
        self.last_percent = Some(percent);
        self.emit(&ProgressEvent::Progress(percent))
    }

    /// Emit the terminal `PROGRESS:100`. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.last_percent = Some(100);
        self.emit(&ProgressEvent::Progress(100))
    }

    /// Emit a `STAGE:` line.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn stage(&mut self, label: impl Into<String>) -> io::Result<()> {
        self.emit(&ProgressEvent::Stage(label.into()))
    }

    /// Emit free-form text, one line per input line.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn message(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        for line in text.as_ref().lines() {
            if is_reserved(line) {
                writeln!(self.out, "> {line}")?;
            } else {
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush()
    }

    /// Whether the terminal progress line has been written.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Recover the wrapped writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &ProgressEvent) -> io::Result<()> {
        writeln!(self.out, "{event}")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(reporter: Reporter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(reporter.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn events_use_reserved_prefixes() {
        let mut r = Reporter::new(Vec::new());
        r.stage("Starting processing...").unwrap();
        r.progress(12).unwrap();
        r.finish().unwrap();
        assert_eq!(
            lines(r),
            vec!["STAGE:Starting processing...", "PROGRESS:12", "PROGRESS:100"]
        );
    }

    #[test]
    fn progress_never_moves_backwards_and_finishes_once() {
        let mut r = Reporter::new(Vec::new());
        for pct in [0, 5, 5, 3, 40, 100, 99] {
            r.progress(pct).unwrap();
        }
        r.finish().unwrap();
        r.finish().unwrap();
        r.progress(50).unwrap();
        assert!(r.is_finished());
        assert_eq!(
            lines(r),
            vec!["PROGRESS:0", "PROGRESS:5", "PROGRESS:40", "PROGRESS:99", "PROGRESS:100"]
        );
    }

    #[test]
    fn messages_never_start_with_reserved_prefix() {
        let mut r = Reporter::new(Vec::new());
        r.message("PROGRESS:7 looks like progress\nplain line").unwrap();
        r.message("STAGE:sneaky").unwrap();
        let out = lines(r);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|l| !is_reserved(l)));
        assert_eq!(out[1], "plain line");
    }

    #[test]
    fn percent_is_floored_and_capped() {
        assert_eq!(percent_of(1, 3), Some(33));
        assert_eq!(percent_of(50, 50), Some(99));
        assert_eq!(percent_of(70, 50), Some(99));
        assert_eq!(percent_of(0, 50), Some(0));
        assert_eq!(percent_of(10, 0), None);
    }
}
