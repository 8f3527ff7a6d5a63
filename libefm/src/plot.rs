use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use super::constants::{RECORD_PLOT_SIZE, SENTINEL_VALUE};
use super::error::RenderError;
use super::record::{RecordLog, RecordSeries};

const AXIS_LABEL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year repr:last_two]-[month]-[day] [hour]:[minute]:[second]");
const TITLE_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
const P2P_LIMIT: f64 = 2.0 * SENTINEL_VALUE;

/// Format a unix timestamp (UTC). Out of range values give an empty label.
pub fn format_timestamp(
    timestamp: f64,
    format: &[BorrowedFormatItem<'_>],
) -> Result<String, RenderError> {
    let Ok(moment) = OffsetDateTime::from_unix_timestamp(timestamp.floor() as i64) else {
        return Ok(String::new());
    };
    Ok(moment.format(format)?)
}

fn axis_label(timestamp: &f64) -> String {
    format_timestamp(*timestamp, AXIS_LABEL_FORMAT).unwrap_or_default()
}

/// Time axis covering the record; widened by a second if the record is a single instant
pub fn time_range(timestamps: &[f64]) -> Option<Range<f64>> {
    let finite = timestamps.iter().copied().filter(|t| t.is_finite());
    let (min, max) = finite.fold(None, |acc: Option<(f64, f64)>, t| match acc {
        None => Some((t, t)),
        Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
    })?;
    if max > min {
        Some(min..max)
    } else {
        Some(min..min + 1.0)
    }
}

/// Pair up x and y, leaving out anything NaN
fn finite_points<'a>(x: &'a [f64], y: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    x.iter()
        .zip(y.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
}

/// Which rows become animation frames
pub fn frame_indices(rows: usize, step: usize) -> Vec<usize> {
    (0..rows).step_by(step.max(1)).collect()
}

pub fn frame_name(index: usize) -> String {
    format!("frame_{index:05}.png")
}

/// Angle of the maximum and peak-to-peak amplitude over the whole record, on twin axes
pub fn render_record_plot(
    record: &RecordLog,
    station: &str,
    output: &Path,
) -> Result<(), RenderError> {
    let series = record.analyse();
    let x_range = time_range(record.timestamps())
        .ok_or_else(|| RenderError::NoData(record.path().display().to_string()))?;
    let title = format!(
        "Electric Field Mill data ({station}) {}",
        format_timestamp(x_range.start, TITLE_DATE_FORMAT)?
    );

    let root = BitMapBackend::new(output, RECORD_PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .right_y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), 0.0..1.0)?
        .set_secondary_coord(x_range, -P2P_LIMIT..P2P_LIMIT);

    chart
        .configure_mesh()
        .x_labels(6)
        .x_label_formatter(&axis_label)
        .y_desc("Max value angle (0-1 full range)")
        .y_label_style(("sans-serif", 18).into_font().color(&RED))
        .label_style(("sans-serif", 18).into_font())
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("peak-to-peak amplitude - relative [kV/m]")
        .label_style(("sans-serif", 18).into_font().color(&BLUE))
        .draw()?;

    let times = record.timestamps();
    chart
        .draw_secondary_series(
            finite_points(times, &series.p2p).map(|p| Circle::new(p, 2, BLUE.mix(0.1).filled())),
        )?
        .label("peak-to-peak amplitude")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, BLUE.filled()));
    chart
        .draw_secondary_series(LineSeries::new(
            finite_points(times, &series.smoothed_p2p),
            BLUE.mix(0.5).stroke_width(2),
        ))?
        .label("peak-to-peak amplitude, rolling mean")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_series(
            finite_points(times, &series.angle_index)
                .map(|p| Circle::new(p, 2, RED.mix(0.1).filled())),
        )?
        .label("Max value angle (0-1 full range)")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, RED.filled()));
    chart
        .draw_series(LineSeries::new(
            finite_points(times, &series.smoothed_angle_index),
            RED.mix(0.5),
        ))?
        .label("Max value angle, rolling mean")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    log::info!("Saved record plot to {}", output.display());
    Ok(())
}

fn draw_frame<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    record: &RecordLog,
    series: &RecordSeries,
    angles: &[f64],
    index: usize,
) -> Result<(), RenderError> {
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(RECORD_PLOT_SIZE.1 / 2);
    let times = record.timestamps();
    let now = times[index];
    let x_range = time_range(times)
        .ok_or_else(|| RenderError::NoData(record.path().display().to_string()))?;

    let mut top = ChartBuilder::on(&upper)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, -P2P_LIMIT..P2P_LIMIT)?;
    top.configure_mesh()
        .x_labels(6)
        .x_label_formatter(&axis_label)
        .y_desc("Peak-to-peak amplitude - relative [kV/m]")
        .label_style(("sans-serif", 16).into_font())
        .draw()?;
    top.draw_series(
        finite_points(times, &series.p2p).map(|p| Circle::new(p, 2, BLUE.mix(0.1).filled())),
    )?;
    top.draw_series(LineSeries::new(
        finite_points(times, &series.smoothed_p2p),
        BLUE.mix(0.5).stroke_width(2),
    ))?;
    top.draw_series(DashedLineSeries::new(
        vec![(now, -P2P_LIMIT), (now, P2P_LIMIT)],
        6,
        4,
        RED.stroke_width(1),
    ))?;

    let mut bottom = ChartBuilder::on(&lower)
        .caption(
            format!("Time: {}", format_timestamp(now, AXIS_LABEL_FORMAT)?),
            ("sans-serif", 18).into_font(),
        )
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..180.0, -SENTINEL_VALUE..SENTINEL_VALUE)?;
    bottom
        .configure_mesh()
        .x_desc("Angle [deg]")
        .label_style(("sans-serif", 16).into_font())
        .draw()?;
    bottom.draw_series(LineSeries::new(
        finite_points(angles, &record.rows()[index]),
        BLUE.stroke_width(1),
    ))?;

    root.present()?;
    Ok(())
}

/// Write one PNG per `step` rows into `out_dir`, returning the files in order.
///
/// `progress` receives (frames done, frames total).
pub fn render_frames<F: FnMut(usize, usize)>(
    record: &RecordLog,
    out_dir: &Path,
    step: usize,
    mut progress: F,
) -> Result<Vec<PathBuf>, RenderError> {
    std::fs::create_dir_all(out_dir)?;
    let series = record.analyse();
    let angles = record.angles();
    let indices = frame_indices(record.len(), step);
    let total = indices.len();

    let mut written = Vec::with_capacity(total);
    for (done, index) in indices.into_iter().enumerate() {
        let path = out_dir.join(frame_name(index));
        {
            let root = BitMapBackend::new(&path, RECORD_PLOT_SIZE).into_drawing_area();
            draw_frame(&root, record, &series, &angles, index)?;
        }
        written.push(path);
        progress(done + 1, total);
    }
    log::info!("Wrote {} frames to {}", written.len(), out_dir.display());
    Ok(written)
}
