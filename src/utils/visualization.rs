//! Visualization utilities for spline_tracking
//!
//! Collects path and point series and renders them into a single gnuplot
//! axes on `show` or `save_png`.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{Position2, TrackingError, TrackingResult};
use crate::learning::Evaluation;

/// Color palette for consistent styling
pub mod colors {
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GREEN: &str = "#00AA00";
    pub const GRAY: &str = "#808080";
    pub const MAGENTA: &str = "#FF00FF";

    pub const TASK: &str = BLUE;
    pub const MODEL_REFERENCE: &str = MAGENTA;
    pub const ACTUAL: &str = ORANGE;
    pub const NAIVE: &str = GRAY;
    pub const START: &str = GREEN;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self { color: color.to_string(), line_width: 2.0, caption: caption.to_string() }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self { color: color.to_string(), size: 1.0, symbol: 'O', caption: caption.to_string() }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Series {
    Path { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

fn split(points: &[Position2<f64>]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}

/// Main visualizer struct
pub struct Visualizer {
    title: String,
    x_label: String,
    y_label: String,
    aspect_ratio: Option<f64>,
    series: Vec<Series>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            aspect_ratio: Some(1.0),
            series: Vec::new(),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Number of series added so far
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn plot_path(&mut self, path: &[Position2<f64>], style: &PathStyle) -> &mut Self {
        let (x, y) = split(path);
        self.series.push(Series::Path { x, y, style: style.clone() });
        self
    }

    pub fn plot_points(&mut self, points: &[Position2<f64>], style: &PointStyle) -> &mut Self {
        let (x, y) = split(points);
        self.series.push(Series::Points { x, y, style: style.clone() });
        self
    }

    pub fn plot_start(&mut self, point: Position2<f64>) -> &mut Self {
        self.plot_points(&[point], &PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();

        for series in &self.series {
            match series {
                Series::Path { x, y, style } => {
                    axes.lines(x, y, &[
                        Caption(&style.caption),
                        Color(&style.color),
                        LineWidth(style.line_width),
                    ]);
                }
                Series::Points { x, y, style } => {
                    axes.points(x, y, &[
                        Caption(&style.caption),
                        Color(&style.color),
                        PointSymbol(style.symbol),
                        PointSize(style.size),
                    ]);
                }
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
        figure
    }

    /// Open an interactive gnuplot window
    pub fn show(&self) -> TrackingResult<()> {
        self.render()
            .show()
            .map(|_| ())
            .map_err(|e| TrackingError::Plot(e.to_string()))
    }

    pub fn save_png(&self, path: &str, width: u32, height: u32) -> TrackingResult<()> {
        self.render()
            .save_to_png(path, width, height)
            .map_err(|e| TrackingError::Plot(e.to_string()))
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Task, corrected reference and both followers on one figure
pub fn plot_evaluation(evaluation: &Evaluation) -> Visualizer {
    let task: Vec<Position2<f64>> =
        (0..evaluation.task.len()).map(|i| evaluation.task.point(i)).collect();

    let mut vis = Visualizer::new();
    vis.set_title(&format!(
        "corrected loss {:.2}, naive loss {:.2}",
        evaluation.corrected_loss, evaluation.naive_loss
    ));
    vis.plot_points(&task, &PointStyle::new(colors::TASK, "task nodes"))
        .plot_points(
            &evaluation.corrected_waypoints,
            &PointStyle::new(colors::MODEL_REFERENCE, "model nodes").with_symbol('T'),
        )
        .plot_path(&evaluation.model_reference, &PathStyle::new(colors::MODEL_REFERENCE, "model output").with_line_width(1.0))
        .plot_path(&evaluation.corrected_path, &PathStyle::new(colors::ACTUAL, "actual"))
        .plot_path(&evaluation.naive_path, &PathStyle::new(colors::NAIVE, "naive"));
    if let Some(&start) = evaluation.corrected_path.first() {
        vis.plot_start(start);
    }
    vis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visualizer_collects_series() {
        let mut vis = Visualizer::new();
        let path = [Position2::new(0.0, 0.0), Position2::new(1.0, 0.5)];
        vis.plot_path(&path, &PathStyle::new(colors::ACTUAL, "actual")).plot_start(path[0]);
        assert_eq!(vis.series_count(), 2);
        assert!(vis.aspect_ratio.is_some());
    }

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::NAIVE, "naive").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::NAIVE);
    }
}
