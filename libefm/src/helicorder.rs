use ndarray::Array2;
use plotters::coord::combinators::BindKeyPoints;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::ops::Range;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

use super::analysis::linspace;
use super::config::{HelicorderConfig, OutputFormat, Theme};
use super::constants::{
    AMP_OFFSET, BOTTOM_MARGIN_FACTOR, HELICORDER_SIZE, HOURS_PER_DAY, MINUTES_PER_HOUR,
    PREVIOUS_DAY_CUTOFF_HOUR, SCALE_BAR_KV_PER_M, SCALE_BAR_X, TOP_MARGIN_FACTOR,
};
use super::day_stack::{date_prefix, DayStack};
use super::error::{HelicorderError, RenderError};

/// Pick the day to plot.
///
/// An explicit `YYYYMMDD` wins. Otherwise it is today (UTC), unless the day has only just
/// started, in which case yesterday is still the more useful plot.
pub fn select_date(explicit: Option<&str>, now: OffsetDateTime) -> Result<Date, HelicorderError> {
    if let Some(text) = explicit {
        return parse_date(text);
    }
    let today = now.date();
    if now.hour() < PREVIOUS_DAY_CUTOFF_HOUR {
        log::info!("Current time is before {PREVIOUS_DAY_CUTOFF_HOUR:02}:00 UTC, using yesterday's date");
        today
            .previous_day()
            .ok_or_else(|| HelicorderError::BadDate(date_prefix(&today)))
    } else {
        Ok(today)
    }
}

fn parse_date(text: &str) -> Result<Date, HelicorderError> {
    let bad = || HelicorderError::BadDate(text.to_string());
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let year: i32 = text[0..4].parse().map_err(|_| bad())?;
    let month: u8 = text[4..6].parse().map_err(|_| bad())?;
    let day: u8 = text[6..8].parse().map_err(|_| bad())?;
    let month = Month::try_from(month).map_err(|_| bad())?;
    Date::from_calendar_date(year, month, day).map_err(|_| bad())
}

/// `<output>/<YYYY>_<MM>/<station>_EFI_HELICORDER_<YYYYMMDD>.<ext>`
pub fn output_path(output_root: &Path, station: &str, date: &Date, format: OutputFormat) -> PathBuf {
    output_root
        .join(format!("{:04}_{:02}", date.year(), u8::from(date.month())))
        .join(format!(
            "{station}_EFI_HELICORDER_{}.{}",
            date_prefix(date),
            format.extension()
        ))
}

/// The day as a 24 x maxlen matrix, one row per hour, padded with NaN
#[derive(Debug, Clone)]
pub struct HelicorderMatrix {
    data: Array2<f64>,
}

impl HelicorderMatrix {
    /// None when no hour has any data
    pub fn from_blocks(blocks: &[Option<Vec<f64>>]) -> Option<Self> {
        let maxlen = blocks.iter().flatten().map(|b| b.len()).max()?;
        let mut data = Array2::<f64>::from_elem((blocks.len(), maxlen), f64::NAN);
        for (mut row, block) in data.rows_mut().into_iter().zip(blocks.iter()) {
            if let Some(block) = block {
                for (slot, value) in row.iter_mut().zip(block.iter()) {
                    *slot = *value;
                }
            }
        }
        Some(Self { data })
    }

    pub fn hours(&self) -> usize {
        self.data.nrows()
    }

    pub fn maxlen(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, hour: usize) -> Vec<f64> {
        self.data.row(hour).to_vec()
    }

    pub fn valid_points(&self, hour: usize) -> usize {
        self.data.row(hour).iter().filter(|v| !v.is_nan()).count()
    }

    /// Minutes into the hour for each column
    pub fn minutes(&self) -> Vec<f64> {
        linspace(0.0, MINUTES_PER_HOUR, self.maxlen())
    }
}

/// Vertical position of an hour's zero line. Hour 0 sits at the top.
pub fn baseline(hour: usize) -> f64 {
    (HOURS_PER_DAY - 1 - hour) as f64 * AMP_OFFSET
}

pub fn y_range() -> Range<f64> {
    -(AMP_OFFSET * BOTTOM_MARGIN_FACTOR)
        ..(AMP_OFFSET * HOURS_PER_DAY as f64 + AMP_OFFSET * TOP_MARGIN_FACTOR)
}

/// Inverse of `baseline`, for labelling ticks
fn hour_at(y: f64) -> Option<usize> {
    let steps = (y / AMP_OFFSET).round();
    if steps < 0.0 || steps >= HOURS_PER_DAY as f64 {
        return None;
    }
    Some(HOURS_PER_DAY - 1 - steps as usize)
}

/// Bottom and top of the scale bar, in plot units
pub fn scale_bar(calibration: f64) -> (f64, f64) {
    let bottom = y_range().start + AMP_OFFSET;
    (bottom, bottom + SCALE_BAR_KV_PER_M * calibration)
}

/// Split a trace at NaN gaps so the line is broken where data is missing
pub fn segments(x: &[f64], y: &[f64], offset: f64) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (x, y) in x.iter().zip(y.iter()) {
        if y.is_nan() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push((*x, *y + offset));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeColors {
    pub background: RGBColor,
    pub figure: RGBColor,
    pub text: RGBColor,
    pub even_hour: RGBColor,
    pub odd_hour: RGBColor,
    pub grid: RGBColor,
    pub timestamp: RGBColor,
}

impl ThemeColors {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                background: WHITE,
                figure: WHITE,
                text: BLACK,
                even_hour: BLACK,
                odd_hour: RGBColor(0x00, 0x80, 0x00),
                grid: RGBColor(0x80, 0x80, 0x80),
                timestamp: RGBColor(0x80, 0x80, 0x80),
            },
            Theme::Dark => Self {
                background: RGBColor(0x12, 0x12, 0x12),
                figure: RGBColor(0x1E, 0x1E, 0x1E),
                text: WHITE,
                even_hour: RGBColor(0x00, 0xB7, 0xEB),
                odd_hour: RGBColor(0x00, 0xFF, 0x7F),
                grid: RGBColor(0x40, 0x40, 0x40),
                timestamp: RGBColor(0x80, 0x80, 0x80),
            },
        }
    }

    pub fn hour_color(&self, hour: usize) -> RGBColor {
        if hour % 2 == 0 {
            self.even_hour
        } else {
            self.odd_hour
        }
    }
}

/// Everything the renderer needs besides the data
#[derive(Debug, Clone)]
pub struct HelicorderLabels {
    pub title: String,
    pub footer: String,
    pub calibration: f64,
    pub colors: ThemeColors,
}

impl HelicorderLabels {
    pub fn new(
        station: &str,
        observatory: &str,
        date: &Date,
        calibration: f64,
        theme: Theme,
        generated: OffsetDateTime,
    ) -> Result<Self, HelicorderError> {
        let day_format = format_description!("[year]-[month]-[day]");
        let stamp_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        Ok(Self {
            title: format!(
                "{station} EFI: {} (Observatory: {observatory})",
                date.format(&day_format)?
            ),
            footer: format!("Generated (UTC): {}", generated.format(&stamp_format)?),
            calibration,
            colors: ThemeColors::for_theme(theme),
        })
    }
}

/// Draw the helicorder onto any plotters drawing area
pub fn draw_helicorder<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    matrix: &HelicorderMatrix,
    labels: &HelicorderLabels,
) -> Result<(), RenderError> {
    let colors = labels.colors;
    root.fill(&colors.figure)?;

    let tick_positions: Vec<f64> = (0..HOURS_PER_DAY).map(baseline).collect();
    let mut chart = ChartBuilder::on(root)
        .caption(&labels.title, ("sans-serif", 26).into_font().color(&colors.text))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(
            0.0..(SCALE_BAR_X + 6.0),
            y_range().with_key_points(tick_positions),
        )?;

    chart.plotting_area().fill(&colors.background)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time in minutes")
        .y_desc("UTC hour")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| match hour_at(*v) {
            Some(hour) => format!("{hour:02}h"),
            None => String::new(),
        })
        .axis_style(colors.text)
        .label_style(("sans-serif", 15).into_font().color(&colors.text))
        .axis_desc_style(("sans-serif", 18).into_font().color(&colors.text))
        .draw()?;

    let minutes = matrix.minutes();
    for hour in 0..matrix.hours() {
        let base_y = baseline(hour);
        let points = matrix.valid_points(hour);
        if points > 0 {
            log::debug!("Plotting hour {hour:02} data ({points} valid points)");
            let color = colors.hour_color(hour);
            for segment in segments(&minutes, &matrix.row(hour), base_y) {
                chart.draw_series(LineSeries::new(segment, color.stroke_width(1)))?;
            }
        } else {
            log::debug!("No data to plot for hour {hour:02}");
        }
        chart.draw_series(DashedLineSeries::new(
            vec![(0.0, base_y), (MINUTES_PER_HOUR, base_y)],
            4,
            4,
            colors.grid.stroke_width(1),
        ))?;
    }

    let (bar_bottom, bar_top) = scale_bar(labels.calibration);
    let text_style = ("sans-serif", 22).into_font().color(&colors.text);
    let anchor = Pos::new(HPos::Left, VPos::Center);
    chart.draw_series(LineSeries::new(
        vec![(SCALE_BAR_X, bar_bottom), (SCALE_BAR_X, bar_top)],
        colors.text.stroke_width(2),
    ))?;
    chart.draw_series(
        [("+", bar_top), ("-", bar_bottom)].into_iter().map(|(sign, y)| {
            Text::new(sign.to_string(), (SCALE_BAR_X + 1.0, y), text_style.pos(anchor))
        }),
    )?;
    chart.draw_series(std::iter::once(Text::new(
        format!("{SCALE_BAR_KV_PER_M:.0} kV/m"),
        (SCALE_BAR_X + 1.0, (bar_bottom + bar_top) / 2.0),
        ("sans-serif", 16)
            .into_font()
            .transform(FontTransform::Rotate270)
            .color(&colors.text)
            .pos(Pos::new(HPos::Center, VPos::Top)),
    )))?;

    let (width, height) = root.dim_in_pixel();
    root.draw(&Text::new(
        labels.footer.clone(),
        (width as i32 - 10, height as i32 - 6),
        ("sans-serif", 13)
            .into_font()
            .color(&colors.timestamp)
            .pos(Pos::new(HPos::Right, VPos::Bottom)),
    ))?;

    root.present()?;
    Ok(())
}

/// Render to a file in the requested format
pub fn render_helicorder(
    path: &Path,
    format: OutputFormat,
    matrix: &HelicorderMatrix,
    labels: &HelicorderLabels,
) -> Result<(), RenderError> {
    match format {
        OutputFormat::Png => {
            let root = BitMapBackend::new(path, HELICORDER_SIZE).into_drawing_area();
            draw_helicorder(&root, matrix, labels)
        }
        OutputFormat::Svg => {
            let root = SVGBackend::new(path, HELICORDER_SIZE).into_drawing_area();
            draw_helicorder(&root, matrix, labels)
        }
    }
}

/// Load a day of waveform files and write its helicorder, returning the output file.
///
/// `progress` is called with the number of hours loaded so far.
pub fn run_helicorder<F: FnMut(usize)>(
    config: &HelicorderConfig,
    progress: F,
) -> Result<PathBuf, HelicorderError> {
    let now = OffsetDateTime::now_utc();
    let date = select_date(config.date.as_deref(), now)?;
    let day = date_prefix(&date);
    log::info!("Processing date: {day}");
    log::debug!(
        "Station {}, observatory {}, format {:?}, theme {:?}, calibration {}",
        config.station,
        config.observatory,
        config.format,
        config.theme,
        config.calibration
    );

    let out_file = output_path(&config.output, &config.station, &date, config.format);
    if let Some(parent) = out_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stack = DayStack::new(
        &config.input,
        &config.station,
        &date,
        config.positive_channel,
        config.negative_channel,
    )?;
    let blocks = stack.load_day_with_progress(progress)?;
    let hours_with_data = blocks.iter().filter(|b| b.is_some()).count();
    let matrix =
        HelicorderMatrix::from_blocks(&blocks).ok_or(HelicorderError::NoDataForDay(day))?;
    log::info!(
        "Loaded {hours_with_data} hours of data, at most {} samples per hour",
        matrix.maxlen()
    );

    let labels = HelicorderLabels::new(
        &config.station,
        &config.observatory,
        &date,
        config.calibration,
        config.theme,
        now,
    )?;
    render_helicorder(&out_file, config.format, &matrix, &labels)?;
    log::info!("Saved daily EFI helicorder: {}", out_file.display());
    Ok(out_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_CALIBRATION, DEFAULT_POSITIVE_CHANNEL, WAVEFORM_DATASET};
    use time::macros::{date, datetime};

    #[test]
    fn test_explicit_date() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert_eq!(
            select_date(Some("20240229"), now).unwrap(),
            date!(2024 - 02 - 29)
        );
        for bad in ["2024022", "20230229", "2024-02-2", "20241301", "abcdefgh"] {
            assert!(matches!(
                select_date(Some(bad), now),
                Err(HelicorderError::BadDate(_))
            ));
        }
    }

    #[test]
    fn test_default_date_rolls_back_after_midnight() {
        assert_eq!(
            select_date(None, datetime!(2025-03-01 01:59 UTC)).unwrap(),
            date!(2025 - 02 - 28)
        );
        assert_eq!(
            select_date(None, datetime!(2025-03-01 02:00 UTC)).unwrap(),
            date!(2025 - 03 - 01)
        );
    }

    #[test]
    fn test_output_path() {
        let path = output_path(
            Path::new("/srv/out"),
            "THUNDERMILL01",
            &date!(2025 - 03 - 07),
            OutputFormat::Svg,
        );
        assert_eq!(
            path,
            PathBuf::from("/srv/out/2025_03/THUNDERMILL01_EFI_HELICORDER_20250307.svg")
        );
    }

    #[test]
    fn test_matrix_padding() {
        let mut blocks: Vec<Option<Vec<f64>>> = vec![None; 24];
        blocks[0] = Some(vec![1.0, 2.0, 3.0]);
        blocks[5] = Some(vec![4.0]);
        let matrix = HelicorderMatrix::from_blocks(&blocks).unwrap();
        assert_eq!(matrix.hours(), 24);
        assert_eq!(matrix.maxlen(), 3);
        assert_eq!(matrix.valid_points(5), 1);
        assert!(matrix.row(5)[1].is_nan());
        assert_eq!(matrix.valid_points(10), 0);
        assert_eq!(matrix.minutes(), vec![0.0, 30.0, 60.0]);

        assert!(HelicorderMatrix::from_blocks(&vec![None; 24]).is_none());
    }

    #[test]
    fn test_layout() {
        assert_eq!(baseline(0), 23.0 * AMP_OFFSET);
        assert_eq!(baseline(23), 0.0);
        assert_eq!(hour_at(baseline(7)), Some(7));
        assert_eq!(hour_at(-AMP_OFFSET), None);

        let range = y_range();
        assert_eq!(range.start, -37500.0);
        assert_eq!(range.end, 15000.0 * 24.0 + 33000.0);

        let (bottom, top) = scale_bar(100.0);
        assert_eq!(bottom, -22500.0);
        assert_eq!(top, -21500.0);
    }

    #[test]
    fn test_segments_break_at_gaps() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.0, f64::NAN, 2.0, 3.0, f64::NAN];
        let parts = segments(&x, &y, 10.0);
        assert_eq!(parts, vec![vec![(0.0, 11.0)], vec![(2.0, 12.0), (3.0, 13.0)]]);
    }

    #[test]
    fn test_theme_colors_alternate() {
        let dark = ThemeColors::for_theme(Theme::Dark);
        assert_eq!(dark.hour_color(0), RGBColor(0x00, 0xB7, 0xEB));
        assert_eq!(dark.hour_color(1), RGBColor(0x00, 0xFF, 0x7F));
        assert_eq!(ThemeColors::for_theme(Theme::Light).hour_color(2), BLACK);
    }

    #[test]
    fn test_labels() {
        let labels = HelicorderLabels::new(
            "THUNDERMILL01",
            "Musala",
            &date!(2025 - 03 - 07),
            701.98,
            Theme::Light,
            datetime!(2025-03-08 00:30:05 UTC),
        )
        .unwrap();
        assert_eq!(
            labels.title,
            "THUNDERMILL01 EFI: 2025-03-07 (Observatory: Musala)"
        );
        assert_eq!(labels.footer, "Generated (UTC): 2025-03-08 00:30:05");
    }

    fn sample_labels(theme: Theme) -> HelicorderLabels {
        HelicorderLabels::new(
            "THUNDERMILL01",
            "Musala",
            &date!(2025 - 03 - 07),
            DEFAULT_CALIBRATION,
            theme,
            datetime!(2025-03-08 00:30:05 UTC),
        )
        .unwrap()
    }

    fn sample_matrix() -> HelicorderMatrix {
        let mut blocks = vec![None; HOURS_PER_DAY];
        blocks[0] = Some((0..120).map(|i| (i as f64 * 0.1).sin() * 5000.0).collect());
        blocks[3] = Some(vec![100.0, f64::NAN, f64::NAN, -200.0, 300.0]);
        blocks[23] = Some(vec![0.0; 60]);
        HelicorderMatrix::from_blocks(&blocks).unwrap()
    }

    #[test]
    fn test_render_png_and_svg() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = sample_matrix();

        let png = dir.path().join("day.png");
        render_helicorder(&png, OutputFormat::Png, &matrix, &sample_labels(Theme::Light)).unwrap();
        assert!(std::fs::metadata(&png).unwrap().len() > 0);

        let svg = dir.path().join("day.svg");
        render_helicorder(&svg, OutputFormat::Svg, &matrix, &sample_labels(Theme::Dark)).unwrap();
        let contents = std::fs::read_to_string(&svg).unwrap();
        assert!(contents.starts_with("<svg"));
        assert!(contents.contains("Generated (UTC): 2025-03-08 00:30:05"));
    }

    #[test]
    fn test_run_helicorder_writes_the_day() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let day = input.path().join("2025/03/07");
        std::fs::create_dir_all(&day).unwrap();
        let file = hdf5::File::create(day.join("THUNDERMILL01_20250307_04.h5")).unwrap();
        let mut data = ndarray::Array2::<f64>::zeros((50, 34));
        data.column_mut(DEFAULT_POSITIVE_CHANNEL).fill(3.0);
        file.new_dataset_builder()
            .with_data(&data)
            .create(WAVEFORM_DATASET)
            .unwrap();
        drop(file);

        let config = HelicorderConfig {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            date: Some(String::from("20250307")),
            format: OutputFormat::Svg,
            ..Default::default()
        };
        let mut hours_seen = 0;
        let written = run_helicorder(&config, |done| hours_seen = done).unwrap();
        assert_eq!(
            written,
            output
                .path()
                .join("2025_03/THUNDERMILL01_EFI_HELICORDER_20250307.svg")
        );
        assert!(std::fs::metadata(&written).unwrap().len() > 0);
        assert_eq!(hours_seen, HOURS_PER_DAY);
    }

    #[test]
    fn test_empty_day_is_an_error() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let config = HelicorderConfig {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            date: Some(String::from("20250307")),
            ..Default::default()
        };
        assert!(matches!(
            run_helicorder(&config, |_| {}),
            Err(HelicorderError::NoDataForDay(day)) if day == "20250307"
        ));
    }
}
