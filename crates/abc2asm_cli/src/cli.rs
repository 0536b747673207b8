use std::path::PathBuf;

use clap::{
    Parser, Subcommand, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
    crate_description, crate_name, crate_version,
};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatCli {
    Asm,
    Json,
}

#[derive(Parser)]
#[command(name = crate_name!(),
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Disassembles an Ark bytecode file
    Disasm {
        /// Path to the .abc file
        input: PathBuf,

        /// Where to write the result (default: stdout)
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormatCli::Asm)]
        format: OutputFormatCli,

        /// Prefix for records named after a normalized source path
        #[arg(long)]
        bundle_name: Option<String>,

        /// Leave the string section out of the listing
        #[arg(long, default_value_t = false)]
        skip_strings: bool,

        /// Annotate the listing with input offsets and debug tables
        #[arg(short, long, default_value_t = false)]
        verbose: bool,

        /// Log conversion progress at debug level
        #[arg(long, default_value_t = false)]
        debug: bool,

        /// Write the log to this file instead of stderr
        #[arg(long, value_name = "FILE")]
        debug_file: Option<PathBuf>,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}
