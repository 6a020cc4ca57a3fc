//! SVG rendering of [`Figure`]s with plotters.

use std::path::{Path, PathBuf};

use anyhow::Result;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::debug;

use super::figure::{Dataset, Figure, Plot, Rgba};
use super::ChartError;
use crate::config::ChartsConfig;

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

const FONT: &str = "sans-serif";

/// Output size of rendered charts, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl From<&ChartsConfig> for RenderOptions {
    fn from(config: &ChartsConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render `figure` to an SVG document.
    pub fn render_svg(&self, figure: &Figure) -> Result<String, ChartError> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.options.width, self.options.height))
                .into_drawing_area();
            draw_figure(&root, figure)
                .and_then(|()| root.present().map_err(anyhow::Error::from))
                .map_err(|e| ChartError::Render {
                    chart: figure.name.clone(),
                    message: format!("{e:#}"),
                })?;
        }
        Ok(svg)
    }

    /// Render `figure` to `<dir>/<name>.svg` and return the written path.
    pub fn render_to(&self, figure: &Figure, dir: &Path) -> Result<PathBuf, ChartError> {
        let svg = self.render_svg(figure)?;
        let path = dir.join(format!("{}.svg", figure.name));
        std::fs::write(&path, svg).map_err(|source| ChartError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(chart = figure.name.as_str(), path = %path.display(), "chart written");
        Ok(path)
    }
}

fn draw_figure(root: &Area<'_>, figure: &Figure) -> Result<()> {
    root.fill(&WHITE)?;
    match &figure.plot {
        Plot::Line { labels, datasets } => draw_line(root, figure, labels, datasets)?,
        Plot::Bar { labels, datasets } => draw_bars(root, figure, labels, datasets)?,
        Plot::Heatmap { labels, values } => draw_heatmap(root, figure, labels, values)?,
    }
    draw_stats(root, figure)
}

fn draw_line(root: &Area<'_>, figure: &Figure, labels: &[String], datasets: &[Dataset]) -> Result<()> {
    let points = labels
        .len()
        .max(datasets.iter().map(|d| d.data.len()).max().unwrap_or(0));
    let x_max = (points.max(2) - 1) as f64;
    let (lo, hi) = y_range(figure);

    let mut chart = ChartBuilder::on(root)
        .caption(&figure.title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc(figure.x_axis.as_str())
        .y_desc(figure.y_axis.title.as_str())
        .x_labels(8)
        .x_label_formatter(&|x| category_label(labels, *x))
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()?;

    let baseline = 0f64.clamp(lo, hi);
    for ds in datasets {
        let color = rgb(ds.color);
        let series = ds
            .data
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, v)| (i as f64, *v));
        let anno = if ds.fill {
            chart.draw_series(
                AreaSeries::new(series, baseline, color.mix(0.2)).border_style(color.stroke_width(2)),
            )?
        } else {
            chart.draw_series(LineSeries::new(series, color.stroke_width(2)))?
        };
        anno.label(ds.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

fn draw_bars(root: &Area<'_>, figure: &Figure, labels: &[String], datasets: &[Dataset]) -> Result<()> {
    let categories = labels.len().max(1);
    let (lo, hi) = y_range(figure);

    let mut chart = ChartBuilder::on(root)
        .caption(&figure.title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(categories as f64 - 0.5), lo..hi)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(figure.x_axis.as_str())
        .y_desc(figure.y_axis.title.as_str())
        .x_labels(categories.min(20))
        .x_label_formatter(&|x| category_label(labels, *x))
        .draw()?;

    let group = datasets.len().max(1) as f64;
    let width = 0.8 / group;
    let base = 0f64.clamp(lo, hi);
    for (k, ds) in datasets.iter().enumerate() {
        let color = rgb(ds.color);
        let fill = color.mix(ds.color.a).filled();
        let bars = ds
            .data
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(move |(i, v)| {
                let x0 = i as f64 - 0.4 + k as f64 * width;
                Rectangle::new([(x0, base), (x0 + width, *v)], fill)
            });
        chart
            .draw_series(bars)?
            .label(ds.label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    if datasets.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn draw_heatmap(root: &Area<'_>, figure: &Figure, labels: &[String], values: &[Vec<f64>]) -> Result<()> {
    let n = labels.len().max(1);
    let top = n as f64 - 0.5;

    let mut chart = ChartBuilder::on(root)
        .caption(&figure.title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5f64..top, -0.5f64..top)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(figure.x_axis.as_str())
        .y_desc(figure.y_axis.title.as_str())
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|x| category_label(labels, *x))
        .y_label_formatter(&|y| category_label(labels, (n - 1) as f64 - *y))
        .draw()?;

    let centered = (FONT, 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));

    for (r, row) in values.iter().enumerate() {
        let y = (n - 1 - r.min(n - 1)) as f64;
        for (c, v) in row.iter().enumerate() {
            let x = c as f64;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                heat_color(*v).filled(),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                format!("{v:.2}"),
                (x, y),
                centered.clone(),
            )))?;
        }
    }
    Ok(())
}

/// Summary values in the top-right corner.
fn draw_stats(root: &Area<'_>, figure: &Figure) -> Result<()> {
    let (width, _) = root.dim_in_pixel();
    let style = (FONT, 14).into_font().color(&BLACK);
    for (i, (name, value)) in figure.stats.iter().enumerate() {
        root.draw(&Text::new(
            format!("{name}: {value:.3}"),
            (width as i32 - 180, 50 + 18 * i as i32),
            style.clone(),
        ))?;
    }
    Ok(())
}

/// Label of the category nearest to `x`, or `""` between categories.
fn category_label(labels: &[String], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    labels.get(i as usize).cloned().unwrap_or_default()
}

fn y_range(figure: &Figure) -> (f64, f64) {
    let (mut lo, mut hi) = figure.value_range().unwrap_or((0.0, 1.0));
    if figure.y_axis.begin_at_zero {
        lo = lo.min(0.0);
    }
    if let Some(max) = figure.y_axis.max {
        hi = max;
    }
    if hi - lo < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    let lo = if figure.y_axis.begin_at_zero && lo == 0.0 {
        0.0
    } else {
        lo - pad
    };
    let hi = if figure.y_axis.max.is_some() { hi } else { hi + pad };
    (lo, hi)
}

fn rgb(color: Rgba) -> RGBColor {
    RGBColor(color.r, color.g, color.b)
}

/// Diverging blue-white-red scale over `[-1, 1]`.
fn heat_color(v: f64) -> RGBColor {
    let t = if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
    let (target, t) = if t >= 0.0 {
        ((215.0, 48.0, 39.0), t)
    } else {
        ((69.0, 117.0, 180.0), -t)
    };
    let mix = |end: f64| (255.0 + (end - 255.0) * t).round() as u8;
    RGBColor(mix(target.0), mix(target.1), mix(target.2))
}
