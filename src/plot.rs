//! # Plotting
//!
//! Renders a [`Series`] as a line plot and a [`Slice`] as a colored grid.
//! The output format follows the file extension: `.svg` goes through the
//! SVG backend, anything else is written as a bitmap (PNG).
//!
//! Text (tick labels, axis descriptions, captions) needs a system font.
//! When none can be loaded the figure is still rendered, without text.

use crate::error::{Error, Result};
use crate::series::Series;
use crate::slice::Slice;
use chrono::{NaiveDateTime, TimeDelta};
use log::{debug, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default line-plot size in pixels.
pub const SERIES_FIGURE_SIZE: (u32, u32) = (700, 350);
/// Default heatmap size in pixels.
pub const SLICE_FIGURE_SIZE: (u32, u32) = (600, 480);
/// Default diameter window of a drop-size spectrum plot.
pub const SPECTRUM_X_RANGE: (f64, f64) = (0.0, 6.0);
/// Default fall-velocity window of a drop-size spectrum plot.
pub const SPECTRUM_Y_RANGE: (f64, f64) = (0.0, 10.0);

const COLORBAR_WIDTH: u32 = 90;
const COLORBAR_STEPS: usize = 64;
const FONT: &str = "sans-serif";

/// ColorBrewer "Spectral", from low to high.
const SPECTRAL: [(u8, u8, u8); 11] = [
    (158, 1, 66),
    (213, 62, 79),
    (244, 109, 67),
    (253, 174, 97),
    (254, 224, 139),
    (255, 255, 191),
    (230, 245, 152),
    (171, 221, 164),
    (102, 194, 165),
    (50, 136, 189),
    (94, 79, 162),
];

/// A figure written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFigure {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Line points or grid cells actually drawn.
    pub elements: usize,
}

/// Optional display limits of a line plot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<(NaiveDateTime, NaiveDateTime)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlotOptions {
    pub size: (u32, u32),
    pub limits: AxisLimits,
    pub y_label: Option<String>,
    pub title: Option<String>,
}

impl Default for SeriesPlotOptions {
    fn default() -> Self {
        SeriesPlotOptions {
            size: SERIES_FIGURE_SIZE,
            limits: AxisLimits::default(),
            y_label: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlicePlotOptions {
    pub size: (u32, u32),
    /// Displayed x window; `None` shows the slice's full extent.
    pub x_range: Option<(f64, f64)>,
    /// Displayed y window; `None` shows the slice's full extent.
    pub y_range: Option<(f64, f64)>,
    pub title: Option<String>,
}

impl Default for SlicePlotOptions {
    fn default() -> Self {
        SlicePlotOptions {
            size: SLICE_FIGURE_SIZE,
            x_range: Some(SPECTRUM_X_RANGE),
            y_range: Some(SPECTRUM_Y_RANGE),
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ImageFormat::Svg,
            _ => ImageFormat::Png,
        }
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Whether a system font can be loaded for labels.
fn text_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        let available = FontDesc::new(FontFamily::SansSerif, 12.0, FontStyle::Normal)
            .box_size("0")
            .is_ok();
        if !available {
            warn!("No usable system font found, figures are rendered without text");
        }
        available
    })
}

/// Render `series` as a line plot with time on the x axis.
///
/// Missing values break the line. An empty or all-missing series yields an
/// empty set of axes.
pub fn plot_series<P: AsRef<Path>>(
    series: &Series,
    path: P,
    options: &SeriesPlotOptions,
) -> Result<RenderedFigure> {
    let path = path.as_ref();
    debug!("Plotting series '{}' to {}", series.name(), path.display());

    let elements = match ImageFormat::from_path(path) {
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, options.size).into_drawing_area();
            let n = draw_series(&root, series, options)?;
            root.present().map_err(plot_err)?;
            n
        }
        ImageFormat::Png => {
            let root = BitMapBackend::new(path, options.size).into_drawing_area();
            let n = draw_series(&root, series, options)?;
            root.present().map_err(plot_err)?;
            n
        }
    };

    Ok(RenderedFigure {
        path: path.to_path_buf(),
        width: options.size.0,
        height: options.size.1,
        elements,
    })
}

/// Render `slice` as a colored grid limited to the requested window.
///
/// Cells outside the window or missing are not drawn.
pub fn plot_slice<P: AsRef<Path>>(
    slice: &Slice,
    path: P,
    options: &SlicePlotOptions,
) -> Result<RenderedFigure> {
    let path = path.as_ref();
    debug!("Plotting slice '{}' to {}", slice.name(), path.display());

    let elements = match ImageFormat::from_path(path) {
        ImageFormat::Svg => {
            let root = SVGBackend::new(path, options.size).into_drawing_area();
            let n = draw_slice(&root, slice, options)?;
            root.present().map_err(plot_err)?;
            n
        }
        ImageFormat::Png => {
            let root = BitMapBackend::new(path, options.size).into_drawing_area();
            let n = draw_slice(&root, slice, options)?;
            root.present().map_err(plot_err)?;
            n
        }
    };

    Ok(RenderedFigure {
        path: path.to_path_buf(),
        width: options.size.0,
        height: options.size.1,
        elements,
    })
}

fn draw_series<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    series: &Series,
    options: &SeriesPlotOptions,
) -> Result<usize> {
    root.fill(&WHITE).map_err(plot_err)?;
    let text = text_available();

    let (t0, t1) = options
        .limits
        .time
        .or_else(|| time_extent(series.times()))
        .unwrap_or_default();
    let x_max = seconds_between(t0, t1).max(60.0);
    let visible = |t: &NaiveDateTime| {
        let x = seconds_between(t0, *t);
        (0.0..=x_max).contains(&x)
    };

    let (y0, y1) = options.limits.value.unwrap_or_else(|| {
        let finite = series
            .iter()
            .filter(|(t, v)| v.is_finite() && visible(t))
            .map(|(_, v)| v);
        padded(value_extent(finite).unwrap_or((0.0, 1.0)))
    });

    let mut builder = ChartBuilder::on(root);
    builder.margin(10);
    if text {
        builder.x_label_area_size(30).y_label_area_size(55);
        if let Some(title) = &options.title {
            builder.caption(title, (FONT, 18));
        }
    }
    let mut chart = builder
        .build_cartesian_2d(0.0..x_max, y0..y1)
        .map_err(plot_err)?;

    let span = TimeDelta::seconds(x_max as i64);
    let tick_format = |x: &f64| {
        let t = t0 + TimeDelta::milliseconds((x * 1e3) as i64);
        t.format(tick_pattern(span)).to_string()
    };

    {
        let mut mesh = chart.configure_mesh();
        if text {
            mesh.x_labels(6).x_label_formatter(&tick_format);
            if let Some(label) = &options.y_label {
                mesh.y_desc(label.as_str());
            }
        } else {
            mesh.x_labels(0).y_labels(0);
        }
        mesh.draw().map_err(plot_err)?;
    }

    let times = series.times();
    let values = series.values();
    let mut drawn = 0;
    for run in series.finite_runs() {
        let points: Vec<(f64, f64)> = run
            .filter(|&i| visible(&times[i]))
            .map(|i| (seconds_between(t0, times[i]), values[i]))
            .collect();
        if points.is_empty() {
            continue;
        }
        drawn += points.len();
        chart
            .draw_series(LineSeries::new(points, BLUE.stroke_width(1)))
            .map_err(plot_err)?;
    }

    debug!("Drew {} points of '{}'", drawn, series.name());
    Ok(drawn)
}

fn draw_slice<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    slice: &Slice,
    options: &SlicePlotOptions,
) -> Result<usize> {
    root.fill(&WHITE).map_err(plot_err)?;
    let text = text_available();

    let (width, _) = root.dim_in_pixel();
    let (plot_area, bar_area) = root.split_horizontally(width.saturating_sub(COLORBAR_WIDTH) as i32);

    let x_edges = slice.x().cell_edges();
    let y_edges = slice.y().cell_edges();
    let (x0, x1) = window(options.x_range, &x_edges);
    let (y0, y1) = window(options.y_range, &y_edges);
    let (vmin, vmax) = match slice.value_range() {
        Some((lo, hi)) if hi > lo => (lo, hi),
        Some((lo, _)) => (lo, lo + 1.0),
        None => (0.0, 1.0),
    };

    let mut builder = ChartBuilder::on(&plot_area);
    builder.margin(10);
    if text {
        builder.x_label_area_size(40).y_label_area_size(50);
        let caption = options
            .title
            .clone()
            .unwrap_or_else(|| format!("{} {}", slice.name(), slice.selection()));
        builder.caption(caption, (FONT, 16));
    }
    let mut chart = builder
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_err)?;

    let x_label = slice.x().label();
    let y_label = slice.y().label();
    {
        let mut mesh = chart.configure_mesh();
        mesh.disable_mesh();
        if text {
            mesh.x_desc(x_label.as_str()).y_desc(y_label.as_str());
        } else {
            mesh.x_labels(0).y_labels(0);
        }
        mesh.draw().map_err(plot_err)?;
    }

    let mut cells = Vec::new();
    for ((j, i), &v) in slice.data().indexed_iter() {
        if !v.is_finite() {
            continue;
        }
        let (xa, xb) = ordered(x_edges[i], x_edges[i + 1]);
        let (ya, yb) = ordered(y_edges[j], y_edges[j + 1]);
        if xb <= x0 || xa >= x1 || yb <= y0 || ya >= y1 {
            continue;
        }
        let color = spectral_r((v - vmin) / (vmax - vmin));
        cells.push(Rectangle::new(
            [(xa.max(x0), ya.max(y0)), (xb.min(x1), yb.min(y1))],
            color.filled(),
        ));
    }
    let drawn = cells.len();
    chart.draw_series(cells).map_err(plot_err)?;

    draw_colorbar(&bar_area, vmin, vmax, slice.units(), text)?;

    debug!("Drew {} cells of '{}'", drawn, slice.name());
    Ok(drawn)
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    vmin: f64,
    vmax: f64,
    units: Option<&str>,
    text: bool,
) -> Result<()> {
    let mut builder = ChartBuilder::on(area);
    builder.margin_top(40).margin_bottom(50).margin_right(10);
    if text {
        builder.y_label_area_size(55);
    }
    let mut bar = builder
        .build_cartesian_2d(0.0..1.0, vmin..vmax)
        .map_err(plot_err)?;

    {
        let mut mesh = bar.configure_mesh();
        mesh.disable_mesh().disable_x_axis();
        if text {
            mesh.y_labels(6);
            if let Some(units) = units {
                mesh.y_desc(units);
            }
        } else {
            mesh.y_labels(0);
        }
        mesh.draw().map_err(plot_err)?;
    }

    let step = (vmax - vmin) / COLORBAR_STEPS as f64;
    bar.draw_series((0..COLORBAR_STEPS).map(|k| {
        let lo = vmin + step * k as f64;
        Rectangle::new(
            [(0.0, lo), (1.0, lo + step)],
            spectral_r((k as f64 + 0.5) / COLORBAR_STEPS as f64).filled(),
        )
    }))
    .map_err(plot_err)?;
    Ok(())
}

/// Reversed "Spectral" colormap: 0 → violet, 1 → dark red.
pub fn spectral_r(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let pos = (1.0 - t) * (SPECTRAL.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(SPECTRAL.len() - 1);
    let frac = pos - lower as f64;

    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (SPECTRAL[lower], SPECTRAL[upper]);
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 1e3
}

fn time_extent(times: &[NaiveDateTime]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let min = times.iter().min()?;
    let max = times.iter().max()?;
    Some((*min, *max))
}

fn value_extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Widen a value range by 5% on each side, or by one unit when it is flat.
fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        let margin = (hi - lo) * 0.05;
        (lo - margin, hi + margin)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Displayed window: the requested range, else the extent of the cell edges.
fn window(requested: Option<(f64, f64)>, edges: &[f64]) -> (f64, f64) {
    let (lo, hi) = requested
        .or_else(|| value_extent(edges.iter().copied()))
        .unwrap_or((0.0, 1.0));
    if hi > lo { (lo, hi) } else { (lo, lo + 1.0) }
}

fn tick_pattern(span: TimeDelta) -> &'static str {
    if span > TimeDelta::days(3) {
        "%Y-%m-%d"
    } else if span > TimeDelta::hours(6) {
        "%m-%d %H:%M"
    } else {
        "%H:%M"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::{Axis, SliceSelection};
    use ndarray::Array2;
    use tempfile::tempdir;

    fn t(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn series(values: Vec<f64>) -> Series {
        let t0 = t("2018-08-30 18:00:00");
        let times = (0..values.len())
            .map(|i| t0 + TimeDelta::minutes(i as i64))
            .collect();
        Series::new("intensity", times, values).unwrap()
    }

    fn spectrum() -> Slice {
        // diameters 0.5 .. 9.5 mm, velocities 1 .. 12 m/s
        let x = Axis::new("diameter", Some("mm".into()), (0..10).map(|i| i as f64 + 0.5).collect());
        let y = Axis::new("velocity", Some("m/s".into()), (1..=12).map(|i| i as f64).collect());
        let data = Array2::from_shape_fn((12, 10), |(j, i)| (j * 10 + i) as f64);
        let selection = SliceSelection::At {
            timestamp: t("2018-08-30 18:20:00"),
        };
        Slice::new("spectrum", y, x, data, selection).unwrap()
    }

    #[test]
    fn colormap_endpoints() {
        assert_eq!(spectral_r(0.0), RGBColor(94, 79, 162));
        assert_eq!(spectral_r(1.0), RGBColor(158, 1, 66));
        assert_eq!(spectral_r(0.5), RGBColor(255, 255, 191));
        assert_eq!(spectral_r(f64::NAN), spectral_r(0.0));
        assert_eq!(spectral_r(7.0), spectral_r(1.0));
    }

    #[test]
    fn helpers() {
        assert_eq!(padded((0.0, 10.0)), (-0.5, 10.5));
        assert_eq!(padded((3.0, 3.0)), (2.0, 4.0));
        assert_eq!(window(Some((0.0, 6.0)), &[1.0, 2.0]), (0.0, 6.0));
        assert_eq!(window(None, &[1.0, 2.0, 3.0]), (1.0, 3.0));
        assert_eq!(window(None, &[]), (0.0, 1.0));
        assert_eq!(ImageFormat::from_path(Path::new("a.SVG")), ImageFormat::Svg);
        assert_eq!(ImageFormat::from_path(Path::new("a.png")), ImageFormat::Png);
        assert_eq!(tick_pattern(TimeDelta::minutes(30)), "%H:%M");
        assert_eq!(tick_pattern(TimeDelta::days(30)), "%Y-%m-%d");
    }

    #[test]
    fn series_plot_skips_missing_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.svg");
        let s = series(vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0]);

        let figure = plot_series(&s, &path, &SeriesPlotOptions::default()).unwrap();
        assert_eq!(figure.elements, 5);
        assert_eq!((figure.width, figure.height), SERIES_FIGURE_SIZE);
        assert!(path.exists());
    }

    #[test]
    fn series_plot_respects_time_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.png");
        let s = series(vec![1.0; 10]);
        let options = SeriesPlotOptions {
            limits: AxisLimits {
                time: Some((t("2018-08-30 18:02:00"), t("2018-08-30 18:05:00"))),
                value: Some((0.0, 2.0)),
            },
            y_label: Some("Precipitation [mm]".into()),
            ..SeriesPlotOptions::default()
        };

        let figure = plot_series(&s, &path, &options).unwrap();
        assert_eq!(figure.elements, 4);
        assert!(path.exists());
    }

    #[test]
    fn empty_series_renders_empty_axes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.svg");
        let figure = plot_series(&series(vec![]), &path, &SeriesPlotOptions::default()).unwrap();
        assert_eq!(figure.elements, 0);
        assert!(path.exists());

        let missing = dir.path().join("missing.svg");
        let figure =
            plot_series(&series(vec![f64::NAN; 3]), &missing, &SeriesPlotOptions::default()).unwrap();
        assert_eq!(figure.elements, 0);
    }

    #[test]
    fn slice_plot_clips_to_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spectrum.svg");

        // x edges 0..10 in unit steps, y edges 0.5..12.5: the default window
        // [0, 6] x [0, 10] keeps 6 columns and the 10 rows whose cells start below 10.
        let figure = plot_slice(&spectrum(), &path, &SlicePlotOptions::default()).unwrap();
        assert_eq!(figure.elements, 6 * 10);
        assert!(path.exists());

        let full = plot_slice(
            &spectrum(),
            dir.path().join("full.png"),
            &SlicePlotOptions {
                x_range: None,
                y_range: None,
                ..SlicePlotOptions::default()
            },
        )
        .unwrap();
        assert_eq!(full.elements, 120);
    }

    #[test]
    fn slice_plot_skips_missing_and_out_of_extent() {
        let dir = tempdir().unwrap();
        let mut data = Array2::from_elem((2, 2), 1.0);
        data[[0, 0]] = f64::NAN;
        let slice = Slice::new(
            "spectrum",
            Axis::indexed("velocity", 2),
            Axis::indexed("diameter", 2),
            data,
            SliceSelection::At {
                timestamp: t("2018-08-30 18:20:00"),
            },
        )
        .unwrap();

        let figure = plot_slice(
            &slice,
            dir.path().join("small.svg"),
            &SlicePlotOptions {
                x_range: Some((-5.0, 50.0)),
                y_range: Some((-5.0, 50.0)),
                ..SlicePlotOptions::default()
            },
        )
        .unwrap();
        assert_eq!(figure.elements, 3);

        let outside = plot_slice(
            &slice,
            dir.path().join("outside.svg"),
            &SlicePlotOptions {
                x_range: Some((10.0, 20.0)),
                y_range: None,
                ..SlicePlotOptions::default()
            },
        )
        .unwrap();
        assert_eq!(outside.elements, 0);
    }
}
