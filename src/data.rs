//! Loading QBER samples from CSV and splitting them into train/test partitions.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};
use thiserror::Error;

/// Errors raised while loading or partitioning a dataset
#[derive(Error, Debug)]
pub enum DataError {
    #[error(
        "File '{}' was not found. Make sure the BB84 simulation has been run and the file exists.",
        .path.display()
    )]
    NotFound { path: PathBuf },

    #[error("Failed to read '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Malformed CSV data: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: Attack_Detected must be 0 or 1, got {value}")]
    InvalidLabel { line: usize, value: u8 },

    #[error("Line {line}: QBER_Value must be a rate within [0, 1], got {value}")]
    InvalidQber { line: usize, value: f64 },

    #[error("Train ratio must be strictly between 0 and 1, got {0}")]
    InvalidRatio(f64),

    #[error("Splitting {total} samples with ratio {ratio} leaves an empty partition")]
    EmptyPartition { total: usize, ratio: f64 },
}

/// One channel measurement: the observed error rate and whether Eve was present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "QBER_Value")]
    pub qber_value: f64,
    #[serde(rename = "Attack_Detected")]
    pub attack_detected: u8,
}

impl Sample {
    pub fn new(qber_value: f64, attack_detected: u8) -> Self {
        Sample {
            qber_value,
            attack_detected,
        }
    }
}

pub struct Data {
    filename: String,
    samples: Vec<Sample>,
}

impl Data {
    /// Reads every row of `path`, keeping file order. Columns other than
    /// `QBER_Value` and `Attack_Detected` are ignored.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => DataError::NotFound {
                path: path.to_path_buf(),
            },
            _ => DataError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let mut reader = csv::Reader::from_reader(file);
        let mut samples = Vec::new();
        for (record_index, record) in reader.deserialize::<Sample>().enumerate() {
            let sample = record?;
            // Line 1 is the header.
            let line = record_index + 2;
            if !(0.0..=1.0).contains(&sample.qber_value) {
                return Err(DataError::InvalidQber {
                    line,
                    value: sample.qber_value,
                });
            }
            if sample.attack_detected > 1 {
                return Err(DataError::InvalidLabel {
                    line,
                    value: sample.attack_detected,
                });
            }
            samples.push(sample);
        }

        info!("Loaded {} samples from {}", samples.len(), path.display());

        Ok(Data {
            filename: path.display().to_string(),
            samples,
        })
    }

    pub fn from_samples(filename: impl Into<String>, samples: Vec<Sample>) -> Self {
        Data {
            filename: filename.into(),
            samples,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn head(&self, n: usize) -> &[Sample] {
        &self.samples[..n.min(self.samples.len())]
    }

    /// Number of samples labelled 0 and 1, in that order.
    pub fn class_counts(&self) -> [usize; 2] {
        let attacks = self
            .samples
            .iter()
            .filter(|s| s.attack_detected == 1)
            .count();
        [self.samples.len() - attacks, attacks]
    }

    pub fn qber_by_label(&self, label: u8) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.attack_detected == label)
            .map(|s| s.qber_value)
            .collect()
    }

    /// A printable table of the first `rows` samples.
    pub fn preview(&self, rows: usize) -> Preview<'_> {
        Preview { data: self, rows }
    }

    pub fn split(&self, train_ratio: f64, seed: u64) -> Result<Split, DataError> {
        train_test_split(&self.samples, train_ratio, seed)
    }
}

#[derive(Tabled)]
struct PreviewRow {
    #[tabled(rename = "")]
    index: usize,
    #[tabled(rename = "QBER_Value")]
    qber_value: f64,
    #[tabled(rename = "Attack_Detected")]
    attack_detected: u8,
}

pub struct Preview<'a> {
    data: &'a Data,
    rows: usize,
}

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rows = self
            .data
            .head(self.rows)
            .iter()
            .enumerate()
            .map(|(index, s)| PreviewRow {
                index,
                qber_value: s.qber_value,
                attack_detected: s.attack_detected,
            });
        write!(f, "{}", Table::new(rows))
    }
}

/// Parallel feature and label columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub features: Vec<f64>,
    pub labels: Vec<u8>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn push(&mut self, sample: &Sample) {
        self.features.push(sample.qber_value);
        self.labels.push(sample.attack_detected);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Partition,
    pub test: Partition,
}

/// Shuffles row indices with a seeded RNG and hands the first
/// `round(train_ratio * N)` rows to the training partition.
pub fn train_test_split(
    samples: &[Sample],
    train_ratio: f64,
    seed: u64,
) -> Result<Split, DataError> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(DataError::InvalidRatio(train_ratio));
    }

    let total = samples.len();
    let train_len = (train_ratio * total as f64).round() as usize;
    if train_len == 0 || train_len >= total {
        return Err(DataError::EmptyPartition {
            total,
            ratio: train_ratio,
        });
    }

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut split = Split {
        train: Partition::default(),
        test: Partition::default(),
    };
    for (position, &index) in indices.iter().enumerate() {
        if position < train_len {
            split.train.push(&samples[index]);
        } else {
            split.test.push(&samples[index]);
        }
    }

    debug!(
        "Split {} samples into {} train / {} test (seed {})",
        total,
        split.train.len(),
        split.test.len(),
        seed
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(i as f64 / n as f64, (i % 2) as u8))
            .collect()
    }

    #[test]
    fn loads_rows_in_order() {
        let file = write_csv("QBER_Value,Attack_Detected\n0.01,0\n0.26,1\n0.02,0\n");
        let data = Data::new(file.path()).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(
            data.samples(),
            &[
                Sample::new(0.01, 0),
                Sample::new(0.26, 1),
                Sample::new(0.02, 0)
            ]
        );
        assert_eq!(data.class_counts(), [2, 1]);
        assert_eq!(data.qber_by_label(1), vec![0.26]);
    }

    #[test]
    fn ignores_extra_columns() {
        let file = write_csv("Session,QBER_Value,Raw_Key_Length,Attack_Detected\n1,0.03,500,0\n");
        let data = Data::new(file.path()).unwrap();
        assert_eq!(data.samples(), &[Sample::new(0.03, 0)]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_data.csv");
        match Data::new(&path) {
            Err(DataError::NotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected NotFound, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn missing_column_is_csv_error() {
        let file = write_csv("QBER_Value\n0.01\n");
        assert!(matches!(Data::new(file.path()), Err(DataError::Csv(_))));
    }

    #[test]
    fn non_numeric_value_is_csv_error() {
        let file = write_csv("QBER_Value,Attack_Detected\nhigh,1\n");
        assert!(matches!(Data::new(file.path()), Err(DataError::Csv(_))));
    }

    #[test]
    fn rejects_non_binary_label() {
        let file = write_csv("QBER_Value,Attack_Detected\n0.01,0\n0.3,2\n");
        assert!(matches!(
            Data::new(file.path()),
            Err(DataError::InvalidLabel { line: 3, value: 2 })
        ));
    }

    #[rstest]
    #[case("NaN")]
    #[case("-7.5")]
    #[case("1.2")]
    #[case("inf")]
    fn rejects_qber_outside_unit_interval(#[case] value: &str) {
        let file = write_csv(&format!(
            "QBER_Value,Attack_Detected\n0.01,0\n0.02,0\n{},1\n",
            value
        ));
        match Data::new(file.path()) {
            Err(DataError::InvalidQber { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected InvalidQber, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn accepts_qber_bounds() {
        let file = write_csv("QBER_Value,Attack_Detected\n0,0\n1,1\n");
        let data = Data::new(file.path()).unwrap();
        assert_eq!(data.samples(), &[Sample::new(0.0, 0), Sample::new(1.0, 1)]);
    }

    #[test]
    fn preview_shows_requested_rows() {
        let data = Data::from_samples("mem", samples(10));
        let text = data.preview(5).to_string();
        assert!(text.contains("QBER_Value"));
        assert!(text.contains("Attack_Detected"));
        assert!(text.contains("0.4"));
        assert!(!text.contains("0.5"));
    }

    #[rstest]
    #[case(100, 80, 20)]
    #[case(10, 8, 2)]
    #[case(7, 6, 1)]
    #[case(33, 26, 7)]
    fn split_sizes_follow_rounded_ratio(
        #[case] n: usize,
        #[case] train: usize,
        #[case] test: usize,
    ) {
        let split = train_test_split(&samples(n), 0.8, 42).unwrap();
        assert_eq!(split.train.len(), train);
        assert_eq!(split.test.len(), test);
        assert_eq!(split.train.features.len(), train);
        assert_eq!(split.test.features.len(), test);
    }

    #[test]
    fn split_is_reproducible() {
        let rows = samples(50);
        let first = train_test_split(&rows, 0.8, 42).unwrap();
        let second = train_test_split(&rows, 0.8, 42).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn split_keeps_every_sample_once() {
        let rows = samples(40);
        let split = train_test_split(&rows, 0.8, 42).unwrap();

        let mut seen: Vec<f64> = split
            .train
            .features
            .iter()
            .chain(split.test.features.iter())
            .copied()
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = rows.iter().map(|s| s.qber_value).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn split_keeps_feature_label_pairs() {
        let rows = samples(20);
        let split = train_test_split(&rows, 0.8, 7).unwrap();
        for (x, y) in split.train.features.iter().zip(&split.train.labels) {
            let original = rows.iter().find(|s| s.qber_value == *x).unwrap();
            assert_eq!(original.attack_detected, *y);
        }
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-0.2)]
    #[case(f64::NAN)]
    fn rejects_bad_ratio(#[case] ratio: f64) {
        assert!(matches!(
            train_test_split(&samples(10), ratio, 42),
            Err(DataError::InvalidRatio(_))
        ));
    }

    #[test]
    fn rejects_empty_partition() {
        assert!(matches!(
            train_test_split(&samples(1), 0.8, 42),
            Err(DataError::EmptyPartition { total: 1, .. })
        ));
        assert!(matches!(
            train_test_split(&[], 0.8, 42),
            Err(DataError::EmptyPartition { total: 0, .. })
        ));
    }
}
