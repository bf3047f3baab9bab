use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local};
use std::io::Write;
use std::path::Path;

use super::tracker::{MotionStatus, Transition};

pub type Timestamp = DateTime<Local>;

/// Format used for the `Start`/`End` columns of the export.
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One entered→exited span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionInterval {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Accumulates transition timestamps for a whole run.
///
/// The log alternates entered and exited timestamps. It grows with the
/// session; intervals are only derived at export time.
#[derive(Clone, Debug, Default)]
pub struct SessionRecorder {
    events: Vec<Timestamp>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, transition: Transition, at: Timestamp) {
        log::debug!("session: {:?} at {}", transition, at.format(EXPORT_TIME_FORMAT));
        self.events.push(at);
    }

    /// Close an interval left open at the end of the session.
    ///
    /// When the last known status is present, a closing exited timestamp is
    /// appended. It is never earlier than, nor equal to, the last logged
    /// timestamp. Returns the synthesized timestamp, if any.
    pub fn close(&mut self, last_status: Option<MotionStatus>, at: Timestamp) -> Option<Timestamp> {
        if last_status != Some(MotionStatus::Present) {
            return None;
        }
        let at = match self.events.last() {
            Some(last) if at <= *last => *last + Duration::microseconds(1),
            _ => at,
        };
        self.record(Transition::Exited, at);
        Some(at)
    }

    pub fn events(&self) -> &[Timestamp] {
        &self.events
    }

    /// Pair the log into intervals; an unmatched trailing timestamp is dropped.
    pub fn intervals(&self) -> Vec<DetectionInterval> {
        self.events
            .chunks_exact(2)
            .map(|pair| DetectionInterval {
                start: pair[0],
                end: pair[1],
            })
            .collect()
    }

    /// Write intervals as CSV with a leading row index. Returns the row count.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let intervals = self.intervals();
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["", "Start", "End"])
            .context("write export header")?;
        for (index, interval) in intervals.iter().enumerate() {
            csv.write_record([
                index.to_string(),
                interval.start.format(EXPORT_TIME_FORMAT).to_string(),
                interval.end.format(EXPORT_TIME_FORMAT).to_string(),
            ])
            .context("write export row")?;
        }
        csv.flush().context("flush export")?;
        Ok(intervals.len())
    }

    /// Overwrite `path` with the interval export.
    pub fn export_to_path(&self, path: &Path) -> Result<usize> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create export file {}", path.display()))?;
        let rows = self.write_csv(file)?;
        log::info!("exported {} detection intervals to {}", rows, path.display());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Timestamp {
        Local
            .timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn pairs_events_into_intervals() {
        let mut recorder = SessionRecorder::new();
        recorder.record(Transition::Entered, at(0));
        recorder.record(Transition::Exited, at(5));
        recorder.record(Transition::Entered, at(9));
        recorder.record(Transition::Exited, at(12));

        let intervals = recorder.intervals();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[1].start, at(9));
        assert!(intervals.iter().all(|i| i.end >= i.start));
    }

    #[test]
    fn odd_trailing_event_is_dropped() {
        let mut recorder = SessionRecorder::new();
        recorder.record(Transition::Entered, at(0));
        recorder.record(Transition::Exited, at(1));
        recorder.record(Transition::Entered, at(2));

        let intervals = recorder.intervals();
        assert_eq!(intervals.len(), recorder.events().len() / 2);
        assert_eq!(intervals[0].end, at(1));
    }

    #[test]
    fn close_while_present_appends_one_later_exit() {
        let mut recorder = SessionRecorder::new();
        recorder.record(Transition::Entered, at(10));

        // A clock that has not moved still yields a strictly later exit.
        let closed = recorder.close(Some(MotionStatus::Present), at(10));
        let closed = closed.expect("synthesized exit");
        assert!(closed > at(10));
        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.intervals().len(), 1);
    }

    #[test]
    fn close_while_absent_does_nothing() {
        let mut recorder = SessionRecorder::new();
        recorder.record(Transition::Entered, at(0));
        recorder.record(Transition::Exited, at(3));
        assert_eq!(recorder.close(Some(MotionStatus::Absent), at(4)), None);
        assert_eq!(recorder.close(None, at(4)), None);
        assert_eq!(recorder.events().len(), 2);
    }

    #[test]
    fn csv_has_index_start_and_end_columns() -> Result<()> {
        let mut recorder = SessionRecorder::new();
        recorder.record(Transition::Entered, at(0));
        recorder.record(Transition::Exited, at(2));

        let mut out = Vec::new();
        let rows = recorder.write_csv(&mut out)?;
        assert_eq!(rows, 1);

        let text = String::from_utf8(out)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(",Start,End"));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("0,"));
        assert!(row.contains(&at(0).format(EXPORT_TIME_FORMAT).to_string()));
        assert_eq!(lines.next(), None);
        Ok(())
    }
}
