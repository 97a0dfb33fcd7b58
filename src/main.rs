//! archive-bridge - Legacy archive migration tool

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = archive_bridge::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
