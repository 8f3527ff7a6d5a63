use human_bytes::human_bytes;
use std::path::{Path, PathBuf};
use time::Date;

use super::constants::HOURS_PER_DAY;
use super::error::DayStackError;
use super::hdf_reader::read_efi_difference;

/// Compact form of a date, as used in file names: YYYYMMDD
pub fn date_prefix(date: &Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// The hourly waveform files of one station for one day.
///
/// Files live at `<root>/YYYY/MM/DD/` and are named `<station>_<YYYYMMDD>_<HH>*.h5`. An hour
/// may be split over several files; they are read in name order.
#[derive(Debug)]
pub struct DayStack {
    pub day_path: PathBuf,
    pub hours: Vec<Vec<PathBuf>>,
    pub total_stack_size_bytes: u64,
    positive_channel: usize,
    negative_channel: usize,
}

impl DayStack {
    /// Discover the files for `date`. A missing day directory is an empty stack, not an error
    pub fn new(
        input_root: &Path,
        station: &str,
        date: &Date,
        positive_channel: usize,
        negative_channel: usize,
    ) -> Result<Self, DayStackError> {
        let day_path = input_root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", u8::from(date.month())))
            .join(format!("{:02}", date.day()));
        let (hours, total_stack_size_bytes) =
            Self::get_file_stack(&day_path, station, &date_prefix(date))?;

        Ok(Self {
            day_path,
            hours,
            total_stack_size_bytes,
            positive_channel,
            negative_channel,
        })
    }

    /// Sort the day's .h5 files into hour buckets
    fn get_file_stack(
        day_path: &Path,
        station: &str,
        day_prefix: &str,
    ) -> Result<(Vec<Vec<PathBuf>>, u64), DayStackError> {
        let mut hours: Vec<Vec<PathBuf>> = vec![Vec::new(); HOURS_PER_DAY];
        let mut total_bytes = 0;
        if !day_path.is_dir() {
            log::warn!("Data directory {} does not exist", day_path.display());
            return Ok((hours, total_bytes));
        }

        for item in day_path.read_dir()? {
            let item = item?;
            let name = item.file_name().to_string_lossy().to_string();
            if !name.ends_with(".h5") {
                continue;
            }
            for (hour, bucket) in hours.iter_mut().enumerate() {
                if name.starts_with(&format!("{station}_{day_prefix}_{hour:02}")) {
                    total_bytes += item.metadata()?.len();
                    bucket.push(item.path());
                    break;
                }
            }
        }

        for bucket in hours.iter_mut() {
            bucket.sort();
        }
        Ok((hours, total_bytes))
    }

    pub fn file_count(&self) -> usize {
        self.hours.iter().map(|h| h.len()).sum()
    }

    pub fn files_for_hour(&self, hour: usize) -> Result<&[PathBuf], DayStackError> {
        self.hours
            .get(hour)
            .map(|files| files.as_slice())
            .ok_or(DayStackError::BadHour(hour))
    }

    /// Concatenated EFI difference for one hour, or None if no file in it could be read
    pub fn load_hour(&self, hour: usize) -> Result<Option<Vec<f64>>, DayStackError> {
        let files = self.files_for_hour(hour)?;
        log::debug!("Hour {hour:02}: found {} files", files.len());

        let mut block: Vec<f64> = Vec::new();
        let mut files_read = 0;
        for path in files {
            let size = path.metadata().map(|m| m.len()).unwrap_or(0);
            match read_efi_difference(path, self.positive_channel, self.negative_channel) {
                Ok(difference) => {
                    log::debug!(
                        "Read {} samples ({}) from {}",
                        difference.len(),
                        human_bytes(size as f64),
                        path.display()
                    );
                    block.extend(difference);
                    files_read += 1;
                }
                Err(e) => log::error!("Error processing file {}: {e}", path.display()),
            }
        }

        if files_read == 0 {
            log::debug!("Hour {hour:02}: no data available");
            Ok(None)
        } else {
            log::info!(
                "Hour {hour:02}: read {files_read} files with {} samples",
                block.len()
            );
            Ok(Some(block))
        }
    }

    /// One optional block per hour, 00 through 23
    pub fn load_day(&self) -> Result<Vec<Option<Vec<f64>>>, DayStackError> {
        self.load_day_with_progress(|_| {})
    }

    /// Same as `load_day`, calling `progress` after each hour with the number done
    pub fn load_day_with_progress<F: FnMut(usize)>(
        &self,
        mut progress: F,
    ) -> Result<Vec<Option<Vec<f64>>>, DayStackError> {
        log::info!(
            "Loading {} files ({}) from {}",
            self.file_count(),
            human_bytes(self.total_stack_size_bytes as f64),
            self.day_path.display()
        );
        let mut blocks = Vec::with_capacity(HOURS_PER_DAY);
        for hour in 0..HOURS_PER_DAY {
            blocks.push(self.load_hour(hour)?);
            progress(hour + 1);
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use time::macros::date;

    fn write_hour(dir: &Path, name: &str, rows: usize, fill: f64) {
        let file = hdf5::File::create(dir.join(name)).unwrap();
        let mut data = Array2::<f64>::zeros((rows, 34));
        data.column_mut(13).fill(fill);
        file.new_dataset_builder()
            .with_data(&data)
            .create("waveform")
            .unwrap();
    }

    #[test]
    fn test_date_prefix() {
        assert_eq!(date_prefix(&date!(2025 - 03 - 07)), "20250307");
    }

    #[test]
    fn test_hour_discovery() {
        let root = tempfile::tempdir().unwrap();
        let day = root.path().join("2025/03/07");
        std::fs::create_dir_all(&day).unwrap();
        write_hour(&day, "THUNDERMILL01_20250307_05b.h5", 2, 2.0);
        write_hour(&day, "THUNDERMILL01_20250307_05a.h5", 3, 1.0);
        write_hour(&day, "THUNDERMILL01_20250307_23.h5", 1, 7.0);
        // Wrong station, wrong day, wrong extension
        std::fs::write(day.join("OTHER_20250307_05.h5"), b"").unwrap();
        std::fs::write(day.join("THUNDERMILL01_20250306_05.h5"), b"").unwrap();
        std::fs::write(day.join("THUNDERMILL01_20250307_05.csv"), b"").unwrap();

        let stack =
            DayStack::new(root.path(), "THUNDERMILL01", &date!(2025 - 03 - 07), 13, 33).unwrap();
        assert_eq!(stack.file_count(), 3);
        let hour5 = stack.files_for_hour(5).unwrap();
        assert!(hour5[0].ends_with("THUNDERMILL01_20250307_05a.h5"));
        assert!(hour5[1].ends_with("THUNDERMILL01_20250307_05b.h5"));
        assert!(matches!(
            stack.files_for_hour(24),
            Err(DayStackError::BadHour(24))
        ));

        let blocks = stack.load_day().unwrap();
        assert_eq!(blocks.len(), 24);
        assert_eq!(blocks[5], Some(vec![1.0, 1.0, 1.0, 2.0, 2.0]));
        assert_eq!(blocks[23], Some(vec![7.0]));
        assert!(blocks[0].is_none());
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let day = root.path().join("2025/03/07");
        std::fs::create_dir_all(&day).unwrap();
        std::fs::write(day.join("THUNDERMILL01_20250307_10_broken.h5"), b"not hdf5").unwrap();
        write_hour(&day, "THUNDERMILL01_20250307_10_ok.h5", 2, 4.0);

        let stack =
            DayStack::new(root.path(), "THUNDERMILL01", &date!(2025 - 03 - 07), 13, 33).unwrap();
        assert_eq!(stack.load_hour(10).unwrap(), Some(vec![4.0, 4.0]));
    }

    #[test]
    fn test_missing_day_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let stack =
            DayStack::new(root.path(), "THUNDERMILL01", &date!(2025 - 03 - 07), 13, 33).unwrap();
        assert_eq!(stack.file_count(), 0);
        assert!(stack.load_day().unwrap().iter().all(|b| b.is_none()));
    }
}
