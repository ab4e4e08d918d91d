use std::io;
use std::process;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use qber_detect::bb84::{self, SimulationConfig};
use qber_detect::cli::{Cli, Command, SimulateArgs};
use qber_detect::Config;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => train(Config::from(args)),
        Command::Simulate(args) => simulate(&args),
    }
}

fn train(config: Config) {
    let evaluation = qber_detect::run(&config, &mut io::stdout().lock()).unwrap_or_else(|err| {
        eprintln!("Error: {}", err);
        process::exit(1);
    });

    println!("{}", evaluation);
}

fn simulate(args: &SimulateArgs) {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let samples = bb84::generate_dataset(&SimulationConfig::from(args), &mut rng)
        .unwrap_or_else(|err| {
            eprintln!("Error simulating channel: {}", err);
            process::exit(1);
        });

    bb84::write_samples(&args.output, &samples).unwrap_or_else(|err| {
        eprintln!("Error writing dataset: {}", err);
        process::exit(1);
    });

    println!(
        "Simulated {} BB84 sessions, dataset written to {}",
        samples.len(),
        args.output.display()
    );
}
