use hdf5::{Dataset, File, Group};
use ndarray::Array2;
use std::path::Path;

use super::constants::WAVEFORM_DATASET;
use super::error::HDFReaderError;

/// Find the first two dimensional dataset below a group, depth first in name order
fn find_2d_dataset(group: &Group) -> Result<Option<Dataset>, HDFReaderError> {
    for name in group.member_names()? {
        if let Ok(dataset) = group.dataset(&name) {
            if dataset.ndim() == 2 {
                return Ok(Some(dataset));
            }
        } else if let Ok(subgroup) = group.group(&name) {
            if let Some(found) = find_2d_dataset(&subgroup)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Read the sample matrix (rows are samples, columns are channels) from an EFM waveform file.
///
/// The `waveform` dataset is preferred. Files written by other tooling are searched for the
/// first 2D dataset instead.
pub fn read_waveform(path: &Path) -> Result<Array2<f64>, HDFReaderError> {
    let file = File::open(path)?;
    let dataset = if file.link_exists(WAVEFORM_DATASET) {
        file.dataset(WAVEFORM_DATASET)?
    } else {
        match find_2d_dataset(&file)? {
            Some(dataset) => {
                log::debug!("Using dataset {} in {}", dataset.name(), path.display());
                dataset
            }
            None => return Err(HDFReaderError::NoDataset(path.to_path_buf())),
        }
    };
    Ok(dataset.read_2d::<f64>()?)
}

/// Difference between two channels of a waveform file, sample by sample
pub fn read_efi_difference(
    path: &Path,
    positive: usize,
    negative: usize,
) -> Result<Vec<f64>, HDFReaderError> {
    let waveform = read_waveform(path)?;
    let width = waveform.ncols();
    for column in [positive, negative] {
        if column >= width {
            return Err(HDFReaderError::BadColumn { column, width });
        }
    }
    let difference = &waveform.column(positive) - &waveform.column(negative);
    Ok(difference.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_matrix(path: &Path, group: Option<&str>, name: &str, rows: usize, cols: usize) {
        let file = File::create(path).unwrap();
        let data = Array2::<f64>::from_shape_fn((rows, cols), |(r, c)| (r * 100 + c) as f64);
        let parent: Group = match group {
            Some(g) => file.create_group(g).unwrap(),
            None => file.group("/").unwrap(),
        };
        parent
            .new_dataset_builder()
            .with_data(&data)
            .create(name)
            .unwrap();
    }

    #[test]
    fn test_waveform_difference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("THUNDERMILL01_20250101_00.h5");
        write_matrix(&path, None, "waveform", 4, 40);
        let diff = read_efi_difference(&path, 13, 33).unwrap();
        assert_eq!(diff, vec![-20.0; 4]);
    }

    #[test]
    fn test_nested_dataset_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.h5");
        write_matrix(&path, Some("acq"), "samples", 3, 5);
        let diff = read_efi_difference(&path, 4, 1).unwrap();
        assert_eq!(diff, vec![3.0; 3]);
    }

    #[test]
    fn test_bad_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrow.h5");
        write_matrix(&path, None, "waveform", 2, 10);
        assert!(matches!(
            read_efi_difference(&path, 13, 33),
            Err(HDFReaderError::BadColumn {
                column: 13,
                width: 10
            })
        ));
    }

    #[test]
    fn test_no_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.h5");
        let file = File::create(&path).unwrap();
        file.create_group("nothing_here").unwrap();
        drop(file);
        assert!(matches!(
            read_efi_difference(&path, 0, 1),
            Err(HDFReaderError::NoDataset(_))
        ));
    }
}
