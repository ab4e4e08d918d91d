//! BB84 channel simulation producing labelled QBER samples.
//!
//! The sender prepares random bits in random bases, the channel optionally
//! carries an intercept-resend eavesdropper and flips bits with the natural
//! noise rate, and the receiver measures in random bases. After sifting, the
//! mismatch rate of the two raw keys is the session's QBER.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::Rng;
use thiserror::Error;

use crate::data::Sample;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("A session needs at least one qubit")]
    NoQubits,

    #[error("Failed to write '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to serialize samples: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    /// Z basis
    Rectilinear,
    /// X basis
    Diagonal,
}

impl Basis {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen() {
            Basis::Diagonal
        } else {
            Basis::Rectilinear
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qubit {
    pub value: u8,
    pub basis: Basis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    /// Probability of a bit flip on the wire.
    pub noise: f64,
    /// Fraction of qubits Eve intercepts and resends.
    pub attack_intensity: f64,
}

impl Channel {
    pub fn quiet() -> Self {
        Channel {
            noise: 0.0,
            attack_intensity: 0.0,
        }
    }
}

pub fn generate_qubit<R: Rng + ?Sized>(rng: &mut R) -> Qubit {
    Qubit {
        value: rng.gen_range(0..=1),
        basis: Basis::random(rng),
    }
}

/// Measures `qubit` in `basis`; a mismatched basis yields a coin flip.
pub fn measure_in<R: Rng + ?Sized>(qubit: Qubit, basis: Basis, rng: &mut R) -> u8 {
    if qubit.basis == basis {
        qubit.value
    } else {
        rng.gen_range(0..=1)
    }
}

/// Receiver side: picks a random basis and measures in it.
pub fn measure<R: Rng + ?Sized>(qubit: Qubit, rng: &mut R) -> (Basis, u8) {
    let basis = Basis::random(rng);
    (basis, measure_in(qubit, basis, rng))
}

pub fn transmit<R: Rng + ?Sized>(qubit: Qubit, channel: &Channel, rng: &mut R) -> Qubit {
    let mut transmitted = qubit;

    if channel.attack_intensity > 0.0 && rng.gen_bool(channel.attack_intensity) {
        let eve_basis = Basis::random(rng);
        transmitted = Qubit {
            value: measure_in(transmitted, eve_basis, rng),
            basis: eve_basis,
        };
    }

    if channel.noise > 0.0 && rng.gen_bool(channel.noise) {
        transmitted.value ^= 1;
    }

    transmitted
}

/// Keeps the positions where both sides used the same basis and returns the
/// sender's and receiver's raw keys.
pub fn sift(sent: &[Qubit], bases: &[Basis], results: &[u8]) -> (Vec<u8>, Vec<u8>) {
    sent.iter()
        .zip(bases)
        .zip(results)
        .filter(|((qubit, basis), _)| qubit.basis == **basis)
        .map(|((qubit, _), &result)| (qubit.value, result))
        .unzip()
}

/// Mismatch rate over the shorter key; 0.0 when either key is empty.
pub fn qber(sender_key: &[u8], receiver_key: &[u8]) -> f64 {
    let len = sender_key.len().min(receiver_key.len());
    if len == 0 {
        return 0.0;
    }
    let errors = sender_key
        .iter()
        .zip(receiver_key)
        .filter(|(a, b)| a != b)
        .count();
    errors as f64 / len as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub sent: usize,
    pub sifted: usize,
    pub qber: f64,
}

pub fn run_session<R: Rng + ?Sized>(
    num_qubits: usize,
    channel: &Channel,
    rng: &mut R,
) -> Session {
    let sent: Vec<Qubit> = (0..num_qubits).map(|_| generate_qubit(rng)).collect();

    let mut bases = Vec::with_capacity(num_qubits);
    let mut results = Vec::with_capacity(num_qubits);
    for &qubit in &sent {
        let (basis, result) = measure(transmit(qubit, channel, rng), rng);
        bases.push(basis);
        results.push(result);
    }

    let (sender_key, receiver_key) = sift(&sent, &bases, &results);
    Session {
        sent: num_qubits,
        sifted: sender_key.len(),
        qber: qber(&sender_key, &receiver_key),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub sessions: usize,
    pub qubits_per_session: usize,
    /// Natural noise of each session is drawn from `[0, max_noise]`.
    pub max_noise: f64,
    pub attack_probability: f64,
    /// Intensity of an attacked session is drawn from `[min_attack_intensity, 1]`.
    pub min_attack_intensity: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            sessions: 1000,
            qubits_per_session: 1000,
            max_noise: 0.05,
            attack_probability: 0.5,
            min_attack_intensity: 0.5,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.qubits_per_session == 0 {
            return Err(SimulationError::NoQubits);
        }
        for (name, value) in [
            ("max_noise", self.max_noise),
            ("attack_probability", self.attack_probability),
            ("min_attack_intensity", self.min_attack_intensity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulationError::InvalidProbability { name, value });
            }
        }
        Ok(())
    }
}

/// Runs `config.sessions` independent sessions, one sample each.
pub fn generate_dataset<R: Rng + ?Sized>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Vec<Sample>, SimulationError> {
    config.validate()?;

    let samples: Vec<Sample> = (0..config.sessions)
        .map(|index| {
            let attacked = rng.gen_bool(config.attack_probability);
            let channel = Channel {
                noise: rng.gen_range(0.0..=config.max_noise),
                attack_intensity: if attacked {
                    rng.gen_range(config.min_attack_intensity..=1.0)
                } else {
                    0.0
                },
            };
            let session = run_session(config.qubits_per_session, &channel, rng);
            debug!(
                "Session {}: {:?}, sifted {} of {} bits, QBER {:.4}",
                index, channel, session.sifted, session.sent, session.qber
            );
            Sample::new(session.qber, u8::from(attacked))
        })
        .collect();

    info!(
        "Simulated {} sessions ({} attacked)",
        samples.len(),
        samples.iter().filter(|s| s.attack_detected == 1).count()
    );
    Ok(samples)
}

/// Writes samples as CSV with a `QBER_Value,Attack_Detected` header.
pub fn write_samples(path: &Path, samples: &[Sample]) -> Result<(), SimulationError> {
    let io_error = |source: io::Error| SimulationError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = csv::Writer::from_writer(file);
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush().map_err(io_error)?;

    info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}
