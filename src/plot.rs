//! QBER histograms rendered with [`plotters`].
//!
//! Both classes are drawn as overlapping, semi-transparent bars on a single
//! 1200x800 PNG. The chart is written to disk instead of being shown in a
//! window, so the pipeline never waits on a human.

use std::path::Path;

use log::info;
use plotters::prelude::*;
use thiserror::Error;

use crate::data::Data;

/// Number of bins per class.
pub const BINS: usize = 20;

const NO_ATTACK_COLOR: RGBColor = BLUE;
const ATTACK_COLOR: RGBColor = RED;
const FILL_OPACITY: f64 = 0.6;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("Failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("Failed to draw chart elements: {0}")]
    Drawing(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

type Result<T> = core::result::Result<T, PlotError>;

/// Fixed-width frequency histogram over the observed value range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    lower: f64,
    width: f64,
    counts: Vec<usize>,
}

impl Histogram {
    /// Bins `values` into `bins` equal-width bins spanning `[min, max]`.
    ///
    /// The maximum lands in the last bin. When every value is equal the
    /// range is widened to `[v - 0.5, v + 0.5]`. Returns `None` when there
    /// is nothing to bin.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }

        let mut lower = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut upper = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !lower.is_finite() || !upper.is_finite() {
            return None;
        }
        if lower == upper {
            lower -= 0.5;
            upper += 0.5;
        }

        let width = (upper - lower) / bins as f64;
        let mut counts = vec![0; bins];
        for &value in values {
            let index = (((value - lower) / width).floor() as usize).min(bins - 1);
            counts[index] += 1;
        }

        Some(Histogram {
            lower,
            width,
            counts,
        })
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.lower + self.width * self.counts.len() as f64
    }

    /// `(left edge, right edge, count)` for every bin.
    pub fn bars(&self) -> impl Iterator<Item = (f64, f64, usize)> + '_ {
        self.counts.iter().enumerate().map(move |(i, &count)| {
            let left = self.lower + self.width * i as f64;
            (left, left + self.width, count)
        })
    }

    fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Builds the per-class histograms of QBER expressed in percent.
pub fn class_histograms(data: &Data) -> [Option<Histogram>; 2] {
    [0u8, 1].map(|label| {
        let percent: Vec<f64> = data
            .qber_by_label(label)
            .into_iter()
            .map(|q| q * 100.0)
            .collect();
        Histogram::new(&percent, BINS)
    })
}

/// Renders the QBER distribution of both classes to a PNG at `output_path`.
pub fn render_qber_histogram(data: &Data, output_path: &Path) -> Result<()> {
    let [no_attack, attack] = class_histograms(data);
    let series: Vec<(&Histogram, &str, RGBColor)> = [
        (no_attack.as_ref(), "No attack (natural noise)", NO_ATTACK_COLOR),
        (attack.as_ref(), "Eve attack (elevated noise)", ATTACK_COLOR),
    ]
    .into_iter()
    .filter_map(|(histogram, label, color)| histogram.map(|h| (h, label, color)))
    .collect();

    if series.is_empty() {
        return Err(PlotError::InvalidData(
            "Dataset contains no samples to plot".to_string(),
        ));
    }

    let x_min = series
        .iter()
        .map(|(h, ..)| h.lower())
        .fold(f64::INFINITY, f64::min);
    let x_max = series
        .iter()
        .map(|(h, ..)| h.upper())
        .fold(f64::NEG_INFINITY, f64::max);
    let y_max = series
        .iter()
        .map(|(h, ..)| h.max_count())
        .max()
        .unwrap_or(0) as f64;

    let root = BitMapBackend::new(output_path, (1200, 800));
    let drawing_area = root.into_drawing_area();

    drawing_area
        .fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&drawing_area)
        .caption("QBER distribution (quantum bit error rate)", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(85)
        .build_cartesian_2d(x_min..x_max, 0.0..(y_max * 1.1).max(1.0))
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .bold_line_style(&BLACK.mix(0.5))
        .light_line_style(&WHITE)
        .x_desc("QBER value [%]")
        .y_desc("Frequency")
        .label_style(("sans-serif", 25))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    for (histogram, label, color) in series {
        let fill = color.mix(FILL_OPACITY).filled();
        chart
            .draw_series(histogram.bars().map(|(left, right, count)| {
                Rectangle::new([(left, 0.0), (right, count as f64)], fill)
            }))
            .map_err(|e| PlotError::Drawing(e.to_string()))?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 8), (x + 20, y + 8)], fill));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 25))
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    drawing_area
        .present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    info!("Wrote QBER histogram to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;

    #[test]
    fn bins_span_observed_range() {
        let values: Vec<f64> = (0..=20).map(|i| i as f64).collect();
        let histogram = Histogram::new(&values, 20).unwrap();

        assert_eq!(histogram.lower(), 0.0);
        assert_eq!(histogram.upper(), 20.0);
        assert_eq!(histogram.counts().len(), 20);
        assert_eq!(histogram.counts().iter().sum::<usize>(), values.len());
        // The maximum shares the last bin with its left neighbour.
        assert_eq!(histogram.counts()[19], 2);
        assert_eq!(histogram.counts()[0], 1);
    }

    #[test]
    fn bars_are_contiguous() {
        let histogram = Histogram::new(&[1.0, 2.0, 3.0, 4.0], 4).unwrap();
        let bars: Vec<_> = histogram.bars().collect();

        assert_eq!(bars.len(), 4);
        for pair in bars.windows(2) {
            assert!((pair[0].1 - pair[1].0).abs() < 1e-12);
        }
        assert_eq!(bars.iter().map(|b| b.2).sum::<usize>(), 4);
    }

    #[test]
    fn constant_values_get_unit_range() {
        let histogram = Histogram::new(&[2.5, 2.5, 2.5], 20).unwrap();

        assert_eq!(histogram.lower(), 2.0);
        assert!((histogram.upper() - 3.0).abs() < 1e-12);
        assert_eq!(histogram.counts().iter().sum::<usize>(), 3);
    }

    #[test]
    fn empty_input_has_no_histogram() {
        assert!(Histogram::new(&[], 20).is_none());
        assert!(Histogram::new(&[1.0], 0).is_none());
    }

    #[test]
    fn class_histograms_scale_to_percent() {
        let data = Data::from_samples(
            "mem",
            vec![
                Sample::new(0.01, 0),
                Sample::new(0.03, 0),
                Sample::new(0.20, 1),
                Sample::new(0.30, 1),
            ],
        );
        let [no_attack, attack] = class_histograms(&data);
        let no_attack = no_attack.unwrap();
        let attack = attack.unwrap();

        assert!((no_attack.lower() - 1.0).abs() < 1e-9);
        assert!((no_attack.upper() - 3.0).abs() < 1e-9);
        assert!((attack.lower() - 20.0).abs() < 1e-9);
        assert!((attack.upper() - 30.0).abs() < 1e-9);
        assert_eq!(attack.counts().len(), BINS);
    }

    #[test]
    fn single_class_leaves_other_histogram_empty() {
        let data = Data::from_samples("mem", vec![Sample::new(0.02, 0)]);
        let [no_attack, attack] = class_histograms(&data);
        assert!(no_attack.is_some());
        assert!(attack.is_none());
    }

    #[test]
    fn renders_both_classes_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qber.png");
        let samples = (0..40)
            .flat_map(|i| {
                let step = 0.001 * i as f64;
                [Sample::new(0.01 + step, 0), Sample::new(0.2 + step, 1)]
            })
            .collect();
        let data = Data::from_samples("mem", samples);

        render_qber_histogram(&data, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn empty_dataset_cannot_be_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qber.png");
        let data = Data::from_samples("mem", Vec::new());

        assert!(matches!(
            render_qber_histogram(&data, &path),
            Err(PlotError::InvalidData(_))
        ));
        assert!(!path.exists());
    }
}
