use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use abc2asm_lib::ConvertOptions;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormatCli, TopLevel};

mod cli;

fn init_logging(debug: bool, debug_file: Option<&Path>) -> Result<(), String> {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = match debug_file {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("failed to create log file {path:?}: {e}"))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| format!("failed to install logger: {e}"))
}

fn run_disasm(
    input: PathBuf,
    output: Option<PathBuf>,
    format: OutputFormatCli,
    bundle_name: Option<String>,
    skip_strings: bool,
    verbose: bool,
) -> Result<(), String> {
    let bytes = std::fs::read(&input).map_err(|e| format!("failed to read {input:?}: {e}"))?;
    let options = ConvertOptions {
        bundle_name,
        skip_strings,
        source_binary: Some(input.display().to_string()),
        verbose,
    };
    let program = abc2asm_lib::convert_bytes(&bytes, &options)
        .map_err(|e| format!("conversion failed: {e}"))?;
    tracing::debug!(
        records = program.records.len(),
        functions = program.functions.len(),
        literal_arrays = program.literal_arrays.len(),
        "converted {}",
        input.display()
    );

    let text = match format {
        OutputFormatCli::Asm => abc2asm_lib::dump(&program, &options),
        OutputFormatCli::Json => abc2asm_lib::to_json(&program).map_err(|e| e.to_string())?,
    };
    match output {
        Some(path) => {
            std::fs::write(&path, text).map_err(|e| format!("failed to write {path:?}: {e}"))
        }
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(TopLevel::Disasm {
            input,
            output,
            format,
            bundle_name,
            skip_strings,
            verbose,
            debug,
            debug_file,
        }) => {
            let result = init_logging(debug, debug_file.as_deref()).and_then(|()| {
                run_disasm(input, output, format, bundle_name, skip_strings, verbose)
            });
            if let Err(e) = result {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}
