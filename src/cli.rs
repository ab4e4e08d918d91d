use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::bb84::SimulationConfig;
use crate::Config;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train the eavesdropping classifier on a labelled QBER dataset
    Train(TrainArgs),

    /// Simulate BB84 sessions and write a labelled QBER dataset
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// CSV with QBER_Value and Attack_Detected columns
    #[arg(value_name = "DATA_PATH", default_value = "training_data.csv")]
    pub input: PathBuf,

    /// Fraction of samples used for training
    #[arg(long, default_value_t = 0.8)]
    pub train_ratio: f64,

    /// Seed for the train/test shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Inverse L2 regularization strength
    #[arg(short = 'C', long, default_value_t = 1.0)]
    pub inverse_regularization: f64,

    /// Newton iteration limit
    #[arg(long, default_value_t = 100)]
    pub max_iter: usize,

    /// Stop once both gradient components are within this tolerance
    #[arg(long, default_value_t = 1e-4)]
    pub tol: f64,

    /// Where to save the QBER histogram
    #[arg(long, default_value = "qber_histogram.png")]
    pub plot: PathBuf,

    /// Skip rendering the QBER histogram
    #[arg(long, default_value_t = false)]
    pub no_plot: bool,

    /// Number of rows to preview after loading
    #[arg(long, default_value_t = 5)]
    pub preview: usize,
}

impl From<TrainArgs> for Config {
    fn from(args: TrainArgs) -> Self {
        Config {
            input: args.input,
            train_ratio: args.train_ratio,
            seed: args.seed,
            c: args.inverse_regularization,
            max_iter: args.max_iter,
            tol: args.tol,
            plot: (!args.no_plot).then_some(args.plot),
            preview_rows: args.preview,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Destination CSV
    #[arg(long, short, default_value = "training_data.csv")]
    pub output: PathBuf,

    /// Number of BB84 sessions (one sample each)
    #[arg(long, default_value_t = 1000)]
    pub sessions: usize,

    /// Qubits sent per session
    #[arg(long, default_value_t = 1000)]
    pub qubits: usize,

    /// Upper bound of the natural bit-flip probability
    #[arg(long, default_value_t = 0.05)]
    pub max_noise: f64,

    /// Probability that a session is attacked
    #[arg(long, default_value_t = 0.5)]
    pub attack_probability: f64,

    /// Lower bound of the fraction of qubits Eve intercepts in an attacked session
    #[arg(long, default_value_t = 0.5)]
    pub min_attack_intensity: f64,

    /// RNG seed; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl From<&SimulateArgs> for SimulationConfig {
    fn from(args: &SimulateArgs) -> Self {
        SimulationConfig {
            sessions: args.sessions,
            qubits_per_session: args.qubits,
            max_noise: args.max_noise,
            attack_probability: args.attack_probability,
            min_attack_intensity: args.min_attack_intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Train(args) => args,
            other => panic!("expected train, got {:?}", other),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_defaults_match_config_defaults() {
        let config = Config::from(train_args(&["qber-detect", "train"]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn train_flags_override_defaults() {
        let config = Config::from(train_args(&[
            "qber-detect",
            "train",
            "data/qber.csv",
            "--train-ratio",
            "0.7",
            "--seed",
            "7",
            "-C",
            "10",
            "--tol",
            "1e-6",
            "--no-plot",
            "--preview",
            "3",
        ]));

        assert_eq!(config.input, PathBuf::from("data/qber.csv"));
        assert_eq!(config.train_ratio, 0.7);
        assert_eq!(config.seed, 7);
        assert_eq!(config.c, 10.0);
        assert_eq!(config.tol, 1e-6);
        assert_eq!(config.plot, None);
        assert_eq!(config.preview_rows, 3);
    }

    #[test]
    fn simulate_args_become_simulation_config() {
        let cli = Cli::try_parse_from([
            "qber-detect",
            "simulate",
            "--output",
            "out.csv",
            "--sessions",
            "10",
            "--qubits",
            "200",
            "--seed",
            "5",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };

        assert_eq!(args.output, PathBuf::from("out.csv"));
        assert_eq!(args.seed, Some(5));
        let config = SimulationConfig::from(&args);
        assert_eq!(config.sessions, 10);
        assert_eq!(config.qubits_per_session, 200);
        assert_eq!(config.max_noise, SimulationConfig::default().max_noise);
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["qber-detect"]).is_err());
    }
}
