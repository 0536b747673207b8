use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod annotation;
pub mod code;
pub mod convert;
pub mod debug;
pub mod dump;
pub mod error;
pub mod file;
pub mod isa;
pub mod literals;
pub mod module;
pub mod naming;
pub mod panda;
pub mod program;
pub mod reader;
pub mod translate;
pub mod types;

pub use convert::{Converter, convert};
pub use dump::dump;
pub use error::{Abc2AsmError, Result};
pub use file::{AbcFile, EntityId, SourceLanguage};
pub use panda::PandaFile;
pub use program::Program;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Prefix applied to records named by a normalized source path.
    pub bundle_name: Option<String>,
    pub skip_strings: bool,
    /// Name shown in the `# source binary:` header.
    pub source_binary: Option<String>,
    /// Collect input offsets and debug tables and print them as comments.
    pub verbose: bool,
}

pub fn convert_bytes(bytes: &[u8], options: &ConvertOptions) -> Result<Program> {
    let file = PandaFile::parse(bytes)?;
    convert(&file, options)
}

pub fn disassemble_with_options(bytes: &[u8], options: &ConvertOptions) -> Result<String> {
    let program = convert_bytes(bytes, options)?;
    Ok(dump(&program, options))
}

pub fn disassemble(bytes: &[u8]) -> Result<String> {
    disassemble_with_options(bytes, &ConvertOptions::default())
}

/// Reads and disassembles `path`; the file name becomes the source binary
/// header unless one is already set.
pub fn disassemble_file(path: impl AsRef<Path>, options: &ConvertOptions) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut options = options.clone();
    if options.source_binary.is_none() {
        options.source_binary = Some(path.display().to_string());
    }
    disassemble_with_options(&bytes, &options)
}

pub fn to_json(program: &Program) -> Result<String> {
    Ok(serde_json::to_string_pretty(program)?)
}
