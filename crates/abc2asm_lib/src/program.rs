use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Abc2AsmError, Result};
use crate::file::{LiteralTag, SourceLanguage};
use crate::types::Type;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub attributes: BTreeSet<String>,
    pub values: BTreeMap<String, String>,
}

impl Metadata {
    pub fn set_attribute(&mut self, attr: &str) {
        self.attributes.insert(attr.to_string());
    }

    pub fn has_attribute(&self, attr: &str) -> bool {
        self.attributes.contains(attr)
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    U1(bool),
    U8(u8),
    U32(u32),
    F64(f64),
    Str(String),
    /// Synthetic name of a registered literal array.
    LiteralArray(String),
}

impl ScalarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::U1(_) => "u1",
            ScalarValue::U8(_) => "u8",
            ScalarValue::U32(_) => "u32",
            ScalarValue::F64(_) => "f64",
            ScalarValue::Str(_) => "string",
            ScalarValue::LiteralArray(_) => "literalarray",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationElement {
    pub name: String,
    pub value: ScalarValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub elements: Vec<AnnotationElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub metadata: Metadata,
    pub value: Option<ScalarValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub language: SourceLanguage,
    pub metadata: Metadata,
    pub source_file: Option<String>,
    pub fields: Vec<Field>,
    pub annotations: Vec<Annotation>,
    /// Input offsets, collected in verbose mode.
    pub info: Option<RecordInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub offset: u32,
    /// One entry per field, in field order.
    pub field_offsets: Vec<u32>,
}

impl Record {
    pub fn new(name: impl Into<String>, language: SourceLanguage) -> Self {
        Self {
            name: name.into(),
            language,
            metadata: Metadata::default(),
            source_file: None,
            fields: Vec::new(),
            annotations: Vec::new(),
            info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    /// Placeholder that carries a label past the last real instruction.
    Invalid,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Reg(u16),
    Imm(i64),
    FImm(f64),
    /// Escaped string literal, rendered quoted.
    Str(String),
    /// Function, field, record or literal-array name.
    Name(String),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub label: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Instruction {
    pub fn new(mnemonic: &str, operands: Vec<Operand>) -> Self {
        Self {
            opcode: Opcode::Named(mnemonic.to_string()),
            operands,
            label: None,
            line: None,
            column: None,
        }
    }

    pub fn invalid() -> Self {
        Self {
            opcode: Opcode::Invalid,
            operands: Vec::new(),
            label: None,
            line: None,
            column: None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.opcode == Opcode::Invalid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchBlock {
    /// Empty for a catch-all clause.
    pub exception_record: String,
    pub try_begin_label: String,
    pub try_end_label: String,
    pub catch_begin_label: String,
    pub catch_end_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub name: String,
    pub signature: String,
    pub signature_type: String,
    pub reg: i32,
    pub start: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub language: SourceLanguage,
    pub return_type: Type,
    pub params: Vec<Type>,
    pub regs_num: u32,
    pub instructions: Vec<Instruction>,
    pub catch_blocks: Vec<CatchBlock>,
    pub metadata: Metadata,
    pub annotations: Vec<Annotation>,
    pub source_file: Option<String>,
    pub source_code: Option<String>,
    pub local_variables: Vec<LocalVariable>,
    pub slots_num: Option<u32>,
    pub concurrent_module_requests: Option<Vec<u32>>,
    /// Offsets and raw debug tables, collected in verbose mode.
    pub info: Option<MethodInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub offset: u32,
    pub code_offset: Option<u32>,
    /// `(pc, line)` entries as stored in the debug info.
    pub line_table: Vec<(u32, u32)>,
    /// `(pc, column)` entries as stored in the debug info.
    pub column_table: Vec<(u32, u32)>,
    /// Named parameters, placed after the locals in argument registers and
    /// live over the whole body.
    pub parameters: Vec<LocalVariable>,
}

impl Function {
    pub fn new(name: impl Into<String>, language: SourceLanguage) -> Self {
        Self {
            name: name.into(),
            language,
            return_type: Type::any(),
            params: Vec::new(),
            regs_num: 0,
            instructions: Vec::new(),
            catch_blocks: Vec::new(),
            metadata: Metadata::default(),
            annotations: Vec::new(),
            source_file: None,
            source_code: None,
            local_variables: Vec::new(),
            slots_num: None,
            concurrent_module_requests: None,
            info: None,
        }
    }

    /// Signature key used for the function table: `name:(t1,t2)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.pandasm_name()).collect();
        format!("{}:({})", self.name, params.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Escaped string contents.
    Str(String),
    /// Function or literal-array name.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub tag: LiteralTag,
    pub value: LiteralValue,
}

impl Literal {
    pub fn new(tag: LiteralTag, value: LiteralValue) -> Self {
        Self { tag, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteralArray {
    pub literals: Vec<Literal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub language: SourceLanguage,
    pub records: BTreeMap<String, Record>,
    pub functions: BTreeMap<String, Function>,
    pub literal_arrays: BTreeMap<String, LiteralArray>,
    /// Resolved strings keyed by their file offset.
    pub strings: BTreeMap<u32, String>,
}

impl Program {
    pub fn insert_record(&mut self, record: Record) -> Result<()> {
        if self.records.contains_key(&record.name) {
            return Err(Abc2AsmError::Duplicate {
                kind: "record",
                name: record.name,
            });
        }
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    /// Inserts `function` unless its signature is already present.
    pub fn insert_function(&mut self, function: Function) -> bool {
        let key = function.signature();
        if self.functions.contains_key(&key) {
            return false;
        }
        self.functions.insert(key, function);
        true
    }

    pub fn insert_literal_array(&mut self, name: String, array: LiteralArray) -> Result<()> {
        if self.literal_arrays.contains_key(&name) {
            return Err(Abc2AsmError::Duplicate {
                kind: "literal array",
                name,
            });
        }
        self.literal_arrays.insert(name, array);
        Ok(())
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.values().find(|f| f.name == name)
    }
}
