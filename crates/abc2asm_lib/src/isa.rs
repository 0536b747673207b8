use crate::error::{Abc2AsmError, Result};
use crate::reader::Reader;

mod tables {
    use super::{OpInfo, OperandKind};

    include!(concat!(env!("OUT_DIR"), "/isa_tables.rs"));
}

pub use tables::{OPCODE_INFO, PREFIXES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    V4,
    V8,
    V16,
    Imm4,
    Imm8,
    Imm16,
    Imm32,
    Imm64,
    SImm8,
    SImm16,
    SImm32,
    FImm64,
    StringId16,
    MethodId16,
    LiteralId16,
    FieldId16,
}

impl OperandKind {
    fn is_nibble(self) -> bool {
        matches!(self, OperandKind::V4 | OperandKind::Imm4)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    pub prefix: u8,
    pub opcode: u8,
    pub operands: &'static [OperandKind],
    pub is_jump: bool,
}

impl OpInfo {
    pub fn opcode_len(&self) -> usize {
        if self.prefix == 0 { 1 } else { 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    String,
    Method,
    LiteralArray,
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawOperand {
    Reg(u16),
    Imm(i64),
    FImm(f64),
    Id(IdKind, u16),
}

#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub pc: u32,
    pub size: u32,
    pub info: &'static OpInfo,
    pub operands: Vec<RawOperand>,
}

impl RawInstruction {
    /// Branch offset of a jump, relative to its own pc.
    pub fn jump_offset(&self) -> Option<i64> {
        if !self.info.is_jump {
            return None;
        }
        self.operands.iter().find_map(|op| match op {
            RawOperand::Imm(v) => Some(*v),
            _ => None,
        })
    }
}

pub fn lookup(prefix: u8, opcode: u8) -> Option<&'static OpInfo> {
    let idx = if prefix == 0 {
        tables::PRIMARY_INDEX[opcode as usize]
    } else {
        let p = PREFIXES.iter().position(|(_, b)| *b == prefix)?;
        tables::PREFIXED_INDEX[p][opcode as usize]
    };
    match idx {
        0 => None,
        i => OPCODE_INFO.get(i as usize - 1),
    }
}

fn is_prefix(byte: u8) -> bool {
    PREFIXES.iter().any(|(_, b)| *b == byte)
}

/// Decodes the instruction starting at `pc` in `code`.
pub fn decode_instruction(code: &[u8], pc: usize) -> Result<RawInstruction> {
    let first = *code.get(pc).ok_or(Abc2AsmError::Eof { offset: pc })?;
    let (prefix, opcode) = if is_prefix(first) {
        let second = *code.get(pc + 1).ok_or(Abc2AsmError::TruncatedInstruction {
            pc,
            size: 2,
            remaining: code.len() - pc,
        })?;
        (first, second)
    } else {
        (0, first)
    };
    let info = lookup(prefix, opcode).ok_or(Abc2AsmError::InvalidOpcode { prefix, opcode, pc })?;

    let mut r = Reader::at(code, pc + info.opcode_len())?;
    let mut operands = Vec::with_capacity(info.operands.len());
    let mut pending_nibble: Option<u8> = None;
    let truncated = |r: &Reader<'_>| Abc2AsmError::TruncatedInstruction {
        pc,
        size: r.pos() - pc + 1,
        remaining: code.len() - pc,
    };

    for kind in info.operands {
        if !kind.is_nibble() {
            pending_nibble = None;
        }
        let op = match kind {
            OperandKind::V4 | OperandKind::Imm4 => {
                let nibble = match pending_nibble.take() {
                    Some(high) => high,
                    None => {
                        let b = r.get_u8().map_err(|_| truncated(&r))?;
                        pending_nibble = Some(b >> 4);
                        b & 0x0f
                    }
                };
                if *kind == OperandKind::V4 {
                    RawOperand::Reg(nibble as u16)
                } else {
                    RawOperand::Imm(nibble as i64)
                }
            }
            OperandKind::V8 => RawOperand::Reg(r.get_u8().map_err(|_| truncated(&r))? as u16),
            OperandKind::V16 => RawOperand::Reg(r.get_u16().map_err(|_| truncated(&r))?),
            OperandKind::Imm8 => RawOperand::Imm(r.get_u8().map_err(|_| truncated(&r))? as i64),
            OperandKind::Imm16 => RawOperand::Imm(r.get_u16().map_err(|_| truncated(&r))? as i64),
            OperandKind::Imm32 => RawOperand::Imm(r.get_u32().map_err(|_| truncated(&r))? as i64),
            OperandKind::Imm64 => RawOperand::Imm(r.get_u64().map_err(|_| truncated(&r))? as i64),
            OperandKind::SImm8 => RawOperand::Imm(r.get_i8().map_err(|_| truncated(&r))? as i64),
            OperandKind::SImm16 => RawOperand::Imm(r.get_i16().map_err(|_| truncated(&r))? as i64),
            OperandKind::SImm32 => RawOperand::Imm(r.get_i32().map_err(|_| truncated(&r))? as i64),
            OperandKind::FImm64 => RawOperand::FImm(r.get_f64().map_err(|_| truncated(&r))?),
            OperandKind::StringId16 => {
                RawOperand::Id(IdKind::String, r.get_u16().map_err(|_| truncated(&r))?)
            }
            OperandKind::MethodId16 => {
                RawOperand::Id(IdKind::Method, r.get_u16().map_err(|_| truncated(&r))?)
            }
            OperandKind::LiteralId16 => {
                RawOperand::Id(IdKind::LiteralArray, r.get_u16().map_err(|_| truncated(&r))?)
            }
            OperandKind::FieldId16 => {
                RawOperand::Id(IdKind::Field, r.get_u16().map_err(|_| truncated(&r))?)
            }
        };
        operands.push(op);
    }

    Ok(RawInstruction {
        pc: pc as u32,
        size: (r.pos() - pc) as u32,
        info,
        operands,
    })
}
