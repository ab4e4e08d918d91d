//! Detecting eavesdropping on a simulated BB84 channel from its quantum bit
//! error rate.
//!
//! The `train` pipeline loads labelled QBER samples, renders their
//! distribution, splits them with a fixed seed, fits a one-feature logistic
//! regression and reports accuracy, a confusion matrix and per-class
//! precision/recall/F1. The [`bb84`] module produces such datasets.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

pub mod bb84;
pub mod cli;
pub mod data;
pub mod metrics;
pub mod model;
pub mod plot;

pub use data::{Data, DataError, Partition, Sample, Split};
pub use metrics::{ClassificationReport, ConfusionMatrix, MetricsError};
pub use model::{FittedLogisticRegression, LogisticRegression, TrainError};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Failed to write report: {0}")]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input: PathBuf,
    pub train_ratio: f64,
    pub seed: u64,
    /// Inverse L2 regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Gradient tolerance that stops the solver.
    pub tol: f64,
    /// Where to write the QBER histogram; `None` skips plotting.
    pub plot: Option<PathBuf>,
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: PathBuf::from("training_data.csv"),
            train_ratio: 0.8,
            seed: 42,
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
            plot: Some(PathBuf::from("qber_histogram.png")),
            preview_rows: 5,
        }
    }
}

impl Config {
    pub fn model(&self) -> LogisticRegression {
        LogisticRegression::new()
            .with_c(self.c)
            .with_max_iter(self.max_iter)
            .with_tolerance(self.tol)
    }
}

pub struct Classify {
    split: Split,
    params: LogisticRegression,
}

impl Classify {
    pub fn new(split: Split, params: LogisticRegression) -> Self {
        Classify { split, params }
    }

    /// Fits on the training partition and scores the test partition.
    pub fn run(self) -> Result<Evaluation, Error> {
        let train = &self.split.train;
        let test = &self.split.test;

        let model = self.params.fit(&train.features, &train.labels)?;
        let predictions = model.predict(&test.features);
        let confusion = ConfusionMatrix::new(&test.labels, &predictions)?;
        let report = ClassificationReport::from_confusion(&confusion);

        info!(
            "Evaluated {} test samples, accuracy {:.2}%",
            test.len(),
            confusion.accuracy() * 100.0
        );

        Ok(Evaluation {
            train_size: train.len(),
            test_size: test.len(),
            accuracy: confusion.accuracy() * 100.0,
            model,
            predictions,
            confusion,
            report,
        })
    }
}

pub struct Evaluation {
    train_size: usize,
    test_size: usize,
    accuracy: f64,
    model: FittedLogisticRegression,
    predictions: Vec<u8>,
    confusion: ConfusionMatrix,
    report: ClassificationReport,
}

impl Evaluation {
    pub fn train_size(&self) -> usize {
        self.train_size
    }

    pub fn test_size(&self) -> usize {
        self.test_size
    }

    /// Percentage of test samples predicted correctly.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn model(&self) -> &FittedLogisticRegression {
        &self.model
    }

    pub fn predictions(&self) -> &[u8] {
        &self.predictions
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn report(&self) -> &ClassificationReport {
        &self.report
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let border = "-------------------------------------";

        write!(
            f,
            "{}\nAccuracy: {:.2}%\n\nConfusion matrix:\n{}\n\nClassification report:\n{}\n{0}",
            border, self.accuracy, self.confusion, self.report
        )
    }
}

/// Runs the whole train pipeline, writing progress for a human to `out`.
///
/// Fails before plotting or splitting if the input cannot be loaded. A
/// failed chart is only logged, since it does not affect training.
pub fn run<W: Write>(config: &Config, out: &mut W) -> Result<Evaluation, Error> {
    let data = Data::new(&config.input)?;

    writeln!(out, "Data loaded successfully.")?;
    writeln!(out, "Training file: {}", data.filename())?;
    writeln!(
        out,
        "\nFirst {} rows:\n{}",
        config.preview_rows.min(data.len()),
        data.preview(config.preview_rows)
    )?;
    let [natural, attacked] = data.class_counts();
    writeln!(
        out,
        "\nTotal samples: {} (no attack: {}, attack: {})",
        data.len(),
        natural,
        attacked
    )?;

    if let Some(path) = &config.plot {
        match plot::render_qber_histogram(&data, path) {
            Ok(()) => writeln!(out, "\nQBER distribution chart saved to {}", path.display())?,
            Err(e) => warn!("Skipping QBER histogram: {}", e),
        }
    }

    let split = data.split(config.train_ratio, config.seed)?;
    writeln!(
        out,
        "\nTraining set: {} samples, test set: {} samples",
        split.train.len(),
        split.test.len()
    )?;

    let evaluation = Classify::new(split, config.model()).run()?;
    writeln!(
        out,
        "Model trained: P(attack) = sigmoid({:.4} * QBER + {:.4})",
        evaluation.model().coefficient(),
        evaluation.model().intercept()
    )?;

    Ok(evaluation)
}
