//! Reader boundary: typed accessors over an ABC container.
//!
//! The converter only talks to [`AbcFile`]; [`crate::panda::PandaFile`] is the
//! binary implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn offset(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

pub const ACC_PUBLIC: u32 = 0x0001;
pub const ACC_PRIVATE: u32 = 0x0002;
pub const ACC_PROTECTED: u32 = 0x0004;
pub const ACC_STATIC: u32 = 0x0008;
pub const ACC_FINAL: u32 = 0x0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceLanguage {
    #[default]
    EcmaScript,
    PandaAssembly,
}

impl SourceLanguage {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SourceLanguage::EcmaScript),
            1 => Some(SourceLanguage::PandaAssembly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceLanguage::EcmaScript => "ECMAScript",
            SourceLanguage::PandaAssembly => "PandaAssembly",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassData {
    pub access_flags: u32,
    pub source_lang: Option<SourceLanguage>,
    pub source_file: Option<EntityId>,
    pub fields: Vec<EntityId>,
    pub methods: Vec<EntityId>,
    pub annotations: Vec<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct Proto {
    /// Type codes, return type first.
    pub shorty: Vec<u8>,
    /// Descriptors of the reference-typed entries of `shorty`, in order.
    pub ref_types: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct MethodData {
    pub class_id: EntityId,
    pub name_id: EntityId,
    pub access_flags: u32,
    pub proto: Option<Proto>,
    pub code_id: Option<EntityId>,
    pub source_lang: Option<SourceLanguage>,
    pub debug_info_id: Option<EntityId>,
    pub annotations: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Primitive(u8),
    Reference(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFieldValue {
    /// Inline signed value (`INT_VALUE` tag).
    Int(i32),
    /// Raw 32-bit word (`VALUE` tag): an entity offset or a bit pattern.
    Word(u32),
}

impl RawFieldValue {
    pub fn as_u32(self) -> u32 {
        match self {
            RawFieldValue::Int(v) => v as u32,
            RawFieldValue::Word(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldData {
    pub class_id: EntityId,
    pub name_id: EntityId,
    pub ty: FieldType,
    pub access_flags: u32,
    pub value: Option<RawFieldValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchData {
    /// Class index of the caught type; `None` for a catch-all clause.
    pub type_idx: Option<u16>,
    pub handler_pc: u32,
    pub code_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryData {
    pub start_pc: u32,
    pub length: u32,
    pub catches: Vec<CatchData>,
}

#[derive(Debug, Clone)]
pub struct CodeData<'a> {
    pub num_vregs: u32,
    pub num_args: u32,
    pub instructions: &'a [u8],
    pub tries: Vec<TryData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralTag {
    TagValue,
    Bool,
    Integer,
    Float,
    Double,
    String,
    Method,
    GeneratorMethod,
    Accessor,
    MethodAffiliate,
    ArrayU1,
    ArrayU8,
    ArrayI8,
    ArrayU16,
    ArrayI16,
    ArrayU32,
    ArrayI32,
    ArrayU64,
    ArrayI64,
    ArrayF32,
    ArrayF64,
    ArrayString,
    AsyncGeneratorMethod,
    LiteralBufferIndex,
    LiteralArray,
    BuiltinTypeIndex,
    Getter,
    Setter,
    BigInt,
    NullValue,
}

impl LiteralTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        use LiteralTag::*;
        Some(match v {
            0x00 => TagValue,
            0x01 => Bool,
            0x02 => Integer,
            0x03 => Float,
            0x04 => Double,
            0x05 => String,
            0x06 => Method,
            0x07 => GeneratorMethod,
            0x08 => Accessor,
            0x09 => MethodAffiliate,
            0x0a => ArrayU1,
            0x0b => ArrayU8,
            0x0c => ArrayI8,
            0x0d => ArrayU16,
            0x0e => ArrayI16,
            0x0f => ArrayU32,
            0x10 => ArrayI32,
            0x11 => ArrayU64,
            0x12 => ArrayI64,
            0x13 => ArrayF32,
            0x14 => ArrayF64,
            0x15 => ArrayString,
            0x16 => AsyncGeneratorMethod,
            0x17 => LiteralBufferIndex,
            0x18 => LiteralArray,
            0x19 => BuiltinTypeIndex,
            0x1a => Getter,
            0x1b => Setter,
            0x1c => BigInt,
            0xff => NullValue,
            _ => return None,
        })
    }

    /// Width in bytes of the value slot that follows the tag byte.
    pub fn value_width(self) -> usize {
        use LiteralTag::*;
        match self {
            TagValue | Bool | Accessor | NullValue | BuiltinTypeIndex => 1,
            MethodAffiliate => 2,
            Double | BigInt => 8,
            _ => 4,
        }
    }

    pub fn name(self) -> &'static str {
        use LiteralTag::*;
        match self {
            TagValue => "tagvalue",
            Bool | ArrayU1 => "u1",
            Integer | ArrayI32 => "i32",
            Float | ArrayF32 => "f32",
            Double | ArrayF64 => "f64",
            String | ArrayString => "string",
            Method => "method",
            GeneratorMethod => "generator_method",
            AsyncGeneratorMethod => "async_generator_method",
            Accessor => "accessor",
            MethodAffiliate => "method_affiliate",
            ArrayU8 => "u8",
            ArrayI8 => "i8",
            ArrayU16 => "u16",
            ArrayI16 => "i16",
            ArrayU32 => "u32",
            ArrayU64 => "u64",
            ArrayI64 => "i64",
            LiteralBufferIndex => "lit_index",
            LiteralArray => "lit_offset",
            BuiltinTypeIndex => "builtin_type",
            Getter => "getter",
            Setter => "setter",
            BigInt => "bigint",
            NullValue => "null_value",
        }
    }

    pub fn is_array(self) -> bool {
        use LiteralTag::*;
        matches!(
            self,
            ArrayU1
                | ArrayU8
                | ArrayI8
                | ArrayU16
                | ArrayI16
                | ArrayU32
                | ArrayI32
                | ArrayU64
                | ArrayI64
                | ArrayF32
                | ArrayF64
                | ArrayString
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawLiteralValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLiteral {
    pub tag: LiteralTag,
    pub value: RawLiteralValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEntry {
    RegularImport { local_name: EntityId, import_name: EntityId, module_idx: u16 },
    NamespaceImport { local_name: EntityId, module_idx: u16 },
    LocalExport { local_name: EntityId, export_name: EntityId },
    IndirectExport { export_name: EntityId, import_name: EntityId, module_idx: u16 },
    StarExport { module_idx: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRecord {
    pub requests: Vec<EntityId>,
    pub entries: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationElementData {
    pub name_id: EntityId,
    pub tag: u8,
    pub value: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationData {
    pub class_id: EntityId,
    pub elements: Vec<AnnotationElementData>,
    /// Tag bytes as stored; may be shorter than `elements` in corrupt files.
    pub tags: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableData {
    pub name: String,
    pub signature: String,
    pub signature_type: String,
    pub reg: i32,
    pub start_offset: u32,
    pub end_offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub source_file: Option<String>,
    pub source_code: Option<String>,
    /// `(pc, line)` entries in increasing pc order.
    pub line_table: Vec<(u32, u32)>,
    /// `(pc, column)` entries in increasing pc order.
    pub column_table: Vec<(u32, u32)>,
    pub local_variables: Vec<LocalVariableData>,
    pub parameter_names: Vec<Option<String>>,
}

pub trait AbcFile {
    fn file_size(&self) -> u32;

    /// Class index of the file header.
    fn classes(&self) -> Result<Vec<EntityId>>;

    /// Literal-array index of the file header.
    fn literal_arrays(&self) -> Result<Vec<EntityId>>;

    /// Raw (unescaped) string at `id`.
    fn string_data(&self, id: EntityId) -> Result<String>;

    fn is_external(&self, id: EntityId) -> bool;

    fn class(&self, id: EntityId) -> Result<ClassData>;

    fn method(&self, id: EntityId) -> Result<MethodData>;

    fn field(&self, id: EntityId) -> Result<FieldData>;

    fn code(&self, id: EntityId) -> Result<CodeData<'_>>;

    fn literal_array(&self, id: EntityId) -> Result<Vec<RawLiteral>>;

    /// Bytes starting at `id`, used for length-prefixed primitive blobs.
    fn data_at(&self, id: EntityId) -> Result<&[u8]>;

    fn f64_at(&self, id: EntityId) -> Result<f64>;

    fn module_record(&self, id: EntityId) -> Result<ModuleRecord>;

    fn annotation(&self, id: EntityId) -> Result<AnnotationData>;

    /// Resolves a 16-bit operand index of an instruction in method `method_id`.
    fn resolve_index(&self, method_id: EntityId, idx: u16) -> Result<EntityId>;

    fn resolve_class_index(&self, entity_id: EntityId, idx: u16) -> Result<EntityId>;

    fn resolve_field_index(&self, method_id: EntityId, idx: u16) -> Result<EntityId>;

    fn debug_info(&self, method_id: EntityId) -> Result<Option<DebugInfo>>;
}
