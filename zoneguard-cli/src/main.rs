//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use zoneguard_cli::run;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("zoneguard: {err}");
        std::process::exit(1);
    }
}
