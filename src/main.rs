use clap::Parser;
use ekring::constants;
use ekring::error::KeyringError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    let cli = ekring::cli::Cli::parse();
    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // scripts match on the first line
            match err.downcast_ref::<KeyringError>() {
                Some(e) => {
                    println!("{}", e.signal());
                    eprintln!("error: {:#}", err);
                    ExitCode::from(e.exit_code())
                }
                None => {
                    println!("ERROR");
                    eprintln!("error: {:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(constants::LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
