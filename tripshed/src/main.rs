use clap::Parser;
use std::process::ExitCode;
use tripshed::app::{self, CliArgs};

fn main() -> ExitCode {
    env_logger::init();

    let args = CliArgs::parse();
    match app::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
