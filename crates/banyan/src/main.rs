use banyan::config::Config;
use std::process::ExitCode;

fn main() -> ExitCode {
    banyan::init_logging();

    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: banyan <configfile>");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("banyan: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match banyan::run_to_file(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("banyan: {}", err);
            ExitCode::FAILURE
        }
    }
}
