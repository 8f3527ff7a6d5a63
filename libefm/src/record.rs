use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::analysis::{argmax, linspace, moving_average, ptp_orient, steep_drops};
use super::constants::{
    ROTOR_HALF_TURN_DEG, SENTINEL_VALUE, SMOOTHING_WINDOW, STEEP_DROP_THRESHOLD,
};
use super::error::RecordError;

/// A CSV log read back from disk as a rectangular block.
///
/// Rows shorter than the longest one are padded with the sentinel, then everything is
/// shifted down by the sentinel so an idle slot reads 0. Tokens that are not numbers are
/// kept as NaN.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
    timestamps: Vec<f64>,
    rows: Vec<Vec<f64>>,
    width: usize,
}

impl RecordLog {
    pub fn read(path: &Path) -> Result<Self, RecordError> {
        if !path.exists() {
            return Err(RecordError::BadFilePath(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);

        let mut timestamps = Vec::new();
        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split(',');
            let stamp = tokens.next().unwrap_or_default();
            match stamp.trim().parse::<f64>() {
                Ok(ts) => {
                    timestamps.push(ts);
                    raw_rows.push(tokens.map(|t| t.to_string()).collect());
                }
                Err(_) => log::warn!(
                    "Skipping line {} of {}: bad timestamp {stamp:?}",
                    line_number + 1,
                    path.display()
                ),
            }
        }

        let width = raw_rows.iter().map(|r| r.len()).max().unwrap_or(0);
        if timestamps.is_empty() || width == 0 {
            return Err(RecordError::Empty(path.to_path_buf()));
        }

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                let mut values: Vec<f64> = row
                    .iter()
                    .map(|token| token.trim().parse::<f64>().unwrap_or(f64::NAN))
                    .collect();
                values.resize(width, SENTINEL_VALUE);
                values.iter_mut().for_each(|v| *v -= SENTINEL_VALUE);
                values
            })
            .collect();

        log::info!(
            "Loaded {} rows of width {} from {}",
            timestamps.len(),
            width,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            timestamps,
            rows,
            width,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rotor angle of each column, 0 to 180 degrees
    pub fn angles(&self) -> Vec<f64> {
        linspace(0.0, ROTOR_HALF_TURN_DEG, self.width)
    }

    pub fn analyse(&self) -> RecordSeries {
        RecordSeries::from_record(self)
    }
}

/// Per-row quantities derived from a record
#[derive(Debug, Clone)]
pub struct RecordSeries {
    pub p2p: Vec<f64>,
    pub smoothed_p2p: Vec<f64>,
    /// Position of the maximum as a fraction of the row width
    pub angle_index: Vec<f64>,
    pub smoothed_angle_index: Vec<f64>,
    /// Times where the peak-to-peak value falls off sharply
    pub steep_drop_times: Vec<f64>,
}

impl RecordSeries {
    fn from_record(record: &RecordLog) -> Self {
        let width = record.width() as f64;
        let p2p: Vec<f64> = record.rows().iter().map(|r| ptp_orient(r)).collect();
        let angle_index: Vec<f64> = record
            .rows()
            .iter()
            .map(|r| argmax(r).map_or(f64::NAN, |idx| idx as f64 / width))
            .collect();
        let steep_drop_times = steep_drops(&p2p, STEEP_DROP_THRESHOLD)
            .into_iter()
            .map(|idx| record.timestamps()[idx])
            .collect();

        Self {
            smoothed_p2p: moving_average(&p2p, SMOOTHING_WINDOW),
            smoothed_angle_index: moving_average(&angle_index, SMOOTHING_WINDOW),
            p2p,
            angle_index,
            steep_drop_times,
        }
    }
}
