//! Confusion matrix and precision/recall/F1 report for the binary attack label.

use std::fmt;

use tabled::{Table, Tabled};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MetricsError {
    #[error("Got {truth} true labels but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("Label at position {position} must be 0 or 1, got {value}")]
    InvalidLabel { position: usize, value: u8 },
}

/// 2x2 counts of (true label, predicted label); rows are true labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new(truth: &[u8], predicted: &[u8]) -> Result<Self, MetricsError> {
        if truth.len() != predicted.len() {
            return Err(MetricsError::LengthMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }

        let mut counts = [[0; 2]; 2];
        for (position, (&t, &p)) in truth.iter().zip(predicted).enumerate() {
            for value in [t, p] {
                if value > 1 {
                    return Err(MetricsError::InvalidLabel { position, value });
                }
            }
            counts[t as usize][p as usize] += 1;
        }
        Ok(ConfusionMatrix { counts })
    }

    pub fn get(&self, truth: u8, predicted: u8) -> usize {
        self.counts[truth as usize][predicted as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        self.counts[0][0] + self.counts[1][1]
    }

    /// Number of samples whose true label is `label`.
    pub fn row_sum(&self, label: u8) -> usize {
        self.counts[label as usize].iter().sum()
    }

    /// Number of samples predicted as `label`.
    pub fn column_sum(&self, label: u8) -> usize {
        self.counts[0][label as usize] + self.counts[1][label as usize]
    }

    /// Fraction of correct predictions, 0.0 for an empty matrix.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        let [[tn, fp], [fn_, tp]] = self.counts;
        writeln!(f, "[[{:>w$} {:>w$}]", tn, fp, w = width)?;
        write!(f, " [{:>w$} {:>w$}]]", fn_, tp, w = width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let classes = [0u8, 1].map(|label| {
            let hits = matrix.get(label, label);
            let precision = ratio(hits, matrix.column_sum(label));
            let recall = ratio(hits, matrix.row_sum(label));
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support: matrix.row_sum(label),
            }
        });

        let total = matrix.total();
        let macro_avg = ClassMetrics {
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1: (classes[0].f1 + classes[1].f1) / 2.0,
            support: total,
        };
        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        ClassificationReport {
            classes,
            accuracy: matrix.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "")]
    label: String,
    #[tabled(rename = "precision")]
    precision: String,
    #[tabled(rename = "recall")]
    recall: String,
    #[tabled(rename = "f1-score")]
    f1: String,
    #[tabled(rename = "support")]
    support: usize,
}

impl ReportRow {
    fn new(label: &str, metrics: &ClassMetrics) -> Self {
        ReportRow {
            label: label.to_string(),
            precision: format!("{:.2}", metrics.precision),
            recall: format!("{:.2}", metrics.recall),
            f1: format!("{:.2}", metrics.f1),
            support: metrics.support,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rows = vec![
            ReportRow::new("0", &self.classes[0]),
            ReportRow::new("1", &self.classes[1]),
            ReportRow {
                label: "accuracy".to_string(),
                precision: String::new(),
                recall: String::new(),
                f1: format!("{:.2}", self.accuracy),
                support: self.macro_avg.support,
            },
            ReportRow::new("macro avg", &self.macro_avg),
            ReportRow::new("weighted avg", &self.weighted_avg),
        ];
        write!(f, "{}", Table::new(rows))
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
