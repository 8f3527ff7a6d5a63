use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use super::error::LogWriterError;
use super::sample::Sample;

/// Source of wall-clock timestamps (seconds since the Unix epoch)
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1.0e9
    }
}

/// Build the default log file name, `<prefix>log_<YYYYMMDD_HHMMSS>_UTC.csv`
pub fn default_log_name(prefix: &str, now: OffsetDateTime) -> Result<String, LogWriterError> {
    let stamp = now
        .to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
    Ok(format!("{prefix}log_{stamp}_UTC.csv"))
}

/// Append-only CSV logger for raw serial lines.
///
/// Each accepted line becomes `timestamp,raw_line` and is flushed straight away, so a
/// crash or a pulled plug loses at most the line being written. Timestamps never go
/// backwards within one writer, even if the system clock is stepped.
#[derive(Debug)]
pub struct CsvLogWriter<C: Clock = SystemClock> {
    handle: BufWriter<File>,
    path: PathBuf,
    clock: C,
    last_timestamp: f64,
    lines_written: u64,
}

impl CsvLogWriter<SystemClock> {
    /// Open (or create) the log at path for appending
    pub fn open(path: &Path) -> Result<Self, LogWriterError> {
        Self::with_clock(path, SystemClock)
    }
}

impl<C: Clock> CsvLogWriter<C> {
    pub fn with_clock(path: &Path, clock: C) -> Result<Self, LogWriterError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            handle: BufWriter::new(file),
            path: path.to_path_buf(),
            clock,
            last_timestamp: f64::NEG_INFINITY,
            lines_written: 0,
        })
    }

    /// Stamp and append a raw line, returning the stamped sample
    pub fn append(&mut self, raw: &str, values: Vec<i64>) -> Result<Sample, LogWriterError> {
        let timestamp = self.clock.now().max(self.last_timestamp);
        self.last_timestamp = timestamp;
        let sample = Sample::new(timestamp, values);
        writeln!(self.handle, "{}", sample.to_csv_line(raw))?;
        self.handle.flush()?;
        self.lines_written += 1;
        Ok(sample)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Flush and release the file
    pub fn close(mut self) -> Result<(), LogWriterError> {
        self.handle.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Replays a fixed list of timestamps
    struct ScriptedClock(RefCell<Vec<f64>>);

    impl Clock for ScriptedClock {
        fn now(&self) -> f64 {
            self.0.borrow_mut().remove(0)
        }
    }

    #[test]
    fn test_default_log_name() {
        let now = OffsetDateTime::from_unix_timestamp(1720632755).unwrap();
        assert_eq!(
            default_log_name("EFM_THUNDERMILL01", now).unwrap(),
            "EFM_THUNDERMILL01log_20240710_173235_UTC.csv"
        );
    }

    #[test]
    fn test_append_only_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("efm.csv");
        std::fs::write(&path, "1.000000,old\n").unwrap();

        let clock = ScriptedClock(RefCell::new(vec![100.0, 99.5, 101.0]));
        let mut writer = CsvLogWriter::with_clock(&path, clock).unwrap();
        let first = writer.append("1,2,3", vec![1, 2, 3]).unwrap();
        let second = writer.append("4,5", vec![4, 5]).unwrap();
        let third = writer.append("6", vec![6]).unwrap();
        assert_eq!(writer.lines_written(), 3);
        writer.close().unwrap();

        assert_eq!(first.timestamp, 100.0);
        // The clock stepped back; the log must not
        assert_eq!(second.timestamp, 100.0);
        assert_eq!(third.timestamp, 101.0);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1.000000,old",
                "100.000000,1,2,3",
                "100.000000,4,5",
                "101.000000,6"
            ]
        );
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01
        assert!(SystemClock.now() > 1_577_836_800.0);
    }
}
