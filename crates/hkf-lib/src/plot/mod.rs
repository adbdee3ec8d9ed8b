use crate::metrics::history::TrainingHistory;
use crate::segments::{Segment, PRE_BEAT};
use crate::signal::TimeSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const TRAIN_COLOR: Color = Color(0x1F77B4);
pub const TEST_COLOR: Color = Color(0xFF7F0E);
pub const RAW_COLOR: Color = Color(0xB0B0B0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn with_axes(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every point, or `None` for an empty figure.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|series| match series {
            Series::Line(line) => line.points.iter(),
        });
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

fn epoch_line(name: &str, values: &[f64], color: Color) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points: values
            .iter()
            .enumerate()
            .map(|(epoch, value)| [epoch as f64, *value])
            .collect(),
        style: Style {
            width: 2.0,
            color,
        },
    })
}

/// Accuracy and loss curves, each with a "Train" and a "Test" series.
pub fn figures_from_history(history: &TrainingHistory) -> (Figure, Figure) {
    let mut accuracy = Figure::new(Some("Model Accuracy".into())).with_axes("Epoch", "Accuracy");
    accuracy.add_series(epoch_line("Train", &history.train_acc, TRAIN_COLOR));
    accuracy.add_series(epoch_line("Test", &history.test_acc, TEST_COLOR));

    let mut loss = Figure::new(Some("Model Loss".into())).with_axes("Epoch", "Loss");
    loss.add_series(epoch_line("Train", &history.train_loss, TRAIN_COLOR));
    loss.add_series(epoch_line("Test", &history.test_loss, TEST_COLOR));
    (accuracy, loss)
}

/// One beat window with x in samples relative to the beat position.
pub fn figure_from_segment(segment: &Segment, color: u32) -> Figure {
    let points: Vec<[f64; 2]> = segment
        .samples
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 - PRE_BEAT as f64, *value])
        .collect();
    let mut fig = Figure::new(Some(format!("Beat at sample {}", segment.position)))
        .with_axes("Samples from beat", "Amplitude");
    fig.add_series(Series::Line(LineSeries {
        name: format!("label {}", segment.label),
        points,
        style: Style {
            width: 1.4,
            color: Color(color),
        },
    }));
    fig
}

fn time_line(name: &str, series: &TimeSeries, max_points: usize, color: Color) -> Series {
    let dt = 1.0 / series.fs.max(1.0);
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    Series::Line(LineSeries {
        name: name.into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            color,
        },
    })
}

/// Raw and denoised signal overlaid on a shared time axis.
pub fn figure_from_denoised(raw: &TimeSeries, clean: &TimeSeries, max_points: usize) -> Figure {
    let mut fig = Figure::new(Some("Kalman denoising".into())).with_axes("Time (s)", "Amplitude");
    fig.add_series(time_line("Raw", raw, max_points, RAW_COLOR));
    fig.add_series(time_line("Denoised", clean, max_points, TRAIN_COLOR));
    fig
}
