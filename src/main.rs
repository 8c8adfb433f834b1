//
// main.rs
// Dicom-AutoWL
//
// Parses the command line, installs logging and maps any failure onto the process exit code.
//
// Dicom-AutoWL contributors - October 2026

use std::process::ExitCode;

use clap::Parser;
use dicom_autowl::cli::{self, Cli};
use dicom_autowl::error::ErrorKind;

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.quiet);

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = ErrorKind::of(&err);
            match kind {
                ErrorKind::Io => eprintln!("There was an I/O error: {:#}", err),
                ErrorKind::Processing => eprintln!("Processing failed: {:#}", err),
                ErrorKind::Unexpected => eprintln!("There was an unexpected error: {:#}", err),
            }
            ExitCode::from(kind.exit_code())
        }
    }
}
