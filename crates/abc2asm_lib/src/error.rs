use thiserror::Error;

#[derive(Debug, Error)]
pub enum Abc2AsmError {
    #[error("unexpected end of data at offset 0x{offset:x}")]
    Eof { offset: usize },

    #[error("bad magic, not an ABC file")]
    BadMagic,

    #[error("entity offset 0x{offset:x} is out of bounds (file size 0x{size:x})")]
    OffsetOutOfBounds { offset: u32, size: u32 },

    #[error("malformed leb128 at offset 0x{0:x}")]
    InvalidLeb128(usize),

    #[error("malformed mutf-8 string at offset 0x{0:x}")]
    InvalidMutf8(usize),

    #[error("malformed type descriptor `{0}`")]
    InvalidDescriptor(String),

    #[error("invalid opcode 0x{prefix:02x} 0x{opcode:02x} at pc={pc}")]
    InvalidOpcode { prefix: u8, opcode: u8, pc: usize },

    #[error("truncated instruction at pc={pc} (size={size}, remaining={remaining})")]
    TruncatedInstruction { pc: usize, size: usize, remaining: usize },

    #[error("unsupported literal tag: 0x{0:02x}")]
    UnsupportedLiteralTag(u8),

    #[error("unsupported annotation element tag: `{0}`")]
    UnsupportedAnnotationTag(char),

    #[error("unsupported tag 0x{tag:02x} in {item} item at offset 0x{offset:x}")]
    UnsupportedItemTag { item: &'static str, tag: u8, offset: u32 },

    #[error("unsupported value type `{ty}` for field `{field}`")]
    UnsupportedFieldType { field: String, ty: String },

    #[error("invalid {kind} index {index} for entity 0x{entity:x}")]
    InvalidIndex { kind: &'static str, index: u32, entity: u32 },

    #[error("literal value does not match its `{0}` tag")]
    LiteralValueMismatch(&'static str),

    #[error("duplicate {kind} `{name}` in program")]
    Duplicate { kind: &'static str, name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Abc2AsmError>;
