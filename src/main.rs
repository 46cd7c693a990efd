//! Athene binary crate.

use std::io::{self, BufReader, Write};
use std::process::exit;

use clap::Parser;
use fs_err as fs;

use athene::aig::aiger::{read_aiger, write_aiger, AigerError, AigerMode};
use athene::options::{CliOptions, OutputFormat, TraceLevel};
use athene::{check_with, Verdict};

/// Exit codes of the checker: 0 equivalent, 1 counterexample found,
/// 2 undetermined, 10 and above internal or input errors.
const EXIT_EQUIVALENT: i32 = 0;
const EXIT_NOT_EQUIVALENT: i32 = 1;
const EXIT_UNDETERMINED: i32 = 2;
const EXIT_ERROR: i32 = 10;

fn main() {
    match athene_main() {
        Ok(code) => exit(code),
        Err(error) => {
            // discard the result as we cannot further propagate a write error
            let _ = writeln!(io::stderr(), "Error: {}", error);
            exit(EXIT_ERROR);
        }
    }
}

/// Initialize the logging framework with the given trace level.
///
/// # Errors
///
/// Returns an error if the logging framework has already been initialized.
fn initialize_logging(level: TraceLevel, verbose: bool) -> io::Result<()> {
    let mut filter = log::LevelFilter::from(level);
    if verbose && filter < log::LevelFilter::Info {
        // the per-iteration statistics lines are logged at info
        filter = log::LevelFilter::Info;
    }
    env_logger::builder()
        .filter(None, filter)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Main function that parses the options, reads the miter, runs the
/// check and writes the outputs.
fn athene_main() -> Result<i32, Box<dyn std::error::Error>> {
    let options = CliOptions::parse();
    initialize_logging(options.trace_level, options.check_options.verbose)?;

    let aig = if options.input_file == "-" {
        let stdin = io::stdin();
        let locked = stdin.lock();
        read_aiger(locked)
    } else {
        let file = fs::File::open(&options.input_file)?;
        read_aiger(BufReader::new(file))
    }
    .map_err(|e: AigerError| format!("{}: {}", options.input_file, e))?;

    let check_options = athene::options::CheckOptions::from(&options);
    let result = check_with(aig, &check_options)?;

    writeln!(io::stdout(), "{}", result.verdict())?;
    match result.verdict() {
        Verdict::Equivalent => {
            if let Some(output_file) = &options.output_file {
                let mode = match options.output_format {
                    OutputFormat::Aig => AigerMode::Binary,
                    _ => AigerMode::Ascii,
                };
                let file = fs::File::create(output_file)?;
                write_aiger(result.reduced(), file, mode)?;
            }
            Ok(EXIT_EQUIVALENT)
        }
        Verdict::NotEquivalent => {
            let cex = result.counterexample().expect("verdict carries a witness");
            let bits: String = cex.iter().map(|&b| if b { '1' } else { '0' }).collect();
            writeln!(io::stdout(), "{}", bits)?;
            Ok(EXIT_NOT_EQUIVALENT)
        }
        Verdict::Undetermined => Ok(EXIT_UNDETERMINED),
    }
}
