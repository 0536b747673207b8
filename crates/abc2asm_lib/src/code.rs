//! Function body reconstruction: pc/index maps, labels for jump targets and
//! exception regions, and line/column projection.

use std::collections::{BTreeMap, HashMap};

use tracing::error;

use crate::error::Result;
use crate::isa::{RawInstruction, decode_instruction};
use crate::program::{CatchBlock, Instruction, Operand};

#[derive(Debug, Clone, Default)]
pub struct FlatCode {
    pub raw: Vec<RawInstruction>,
    pub pc_to_index: HashMap<u32, usize>,
    pub index_to_pc: Vec<u32>,
    /// Indices of jump instructions.
    pub jumps: Vec<usize>,
    pub code_size: u32,
}

impl FlatCode {
    /// Index of the instruction starting at `pc`, including the synthetic
    /// end instruction once it exists.
    pub fn index_of(&self, pc: u32) -> Option<usize> {
        self.pc_to_index.get(&pc).copied()
    }

    pub fn real_len(&self) -> usize {
        self.raw.len()
    }

    fn jump_target(&self, idx: usize) -> Option<u32> {
        let insn = &self.raw[idx];
        let target = insn.pc as i64 + insn.jump_offset()?;
        if target < 0 || target > self.code_size as i64 {
            return None;
        }
        Some(target as u32)
    }
}

pub fn decode_body(code: &[u8]) -> Result<FlatCode> {
    let mut flat = FlatCode {
        code_size: code.len() as u32,
        ..FlatCode::default()
    };
    let mut pc = 0usize;
    while pc < code.len() {
        let insn = decode_instruction(code, pc)?;
        let idx = flat.raw.len();
        flat.pc_to_index.insert(pc as u32, idx);
        flat.index_to_pc.push(pc as u32);
        if insn.info.is_jump {
            flat.jumps.push(idx);
        }
        pc += insn.size as usize;
        flat.raw.push(insn);
    }
    Ok(flat)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchRegion {
    /// Empty for catch-all.
    pub exception: String,
    pub begin_pc: u32,
    /// `None` when the handler has no recorded size.
    pub end_pc: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryRegion {
    pub start_pc: u32,
    pub end_pc: u32,
    pub catches: Vec<CatchRegion>,
}

/// One label per instruction index, first assignment wins.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: BTreeMap<usize, String>,
    next_jump: usize,
}

impl LabelTable {
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(&idx).map(String::as_str)
    }

    fn label_or_insert(&mut self, idx: usize, make: impl FnOnce() -> String) -> String {
        self.labels.entry(idx).or_insert_with(make).clone()
    }

    pub fn jump_label(&mut self, idx: usize) -> String {
        if let Some(existing) = self.labels.get(&idx) {
            return existing.clone();
        }
        let name = format!("jump_label_{}", self.next_jump);
        self.next_jump += 1;
        self.labels.insert(idx, name.clone());
        name
    }

    pub fn apply(&self, instructions: &mut [Instruction]) {
        for (idx, label) in &self.labels {
            if let Some(insn) = instructions.get_mut(*idx) {
                insn.label = Some(label.clone());
            }
        }
    }
}

/// Appends the placeholder instruction when a boundary (handler end, try end
/// or jump target) sits exactly at the end of the code. Returns whether one
/// was added.
pub fn ensure_end_instruction(
    instructions: &mut Vec<Instruction>,
    flat: &mut FlatCode,
    tries: &[TryRegion],
) -> bool {
    let end = flat.code_size;
    if flat.pc_to_index.contains_key(&end) {
        return false;
    }
    let needed = tries
        .iter()
        .any(|t| t.end_pc == end || t.catches.iter().any(|c| c.end_pc == Some(end)))
        || flat.jumps.iter().any(|&j| flat.jump_target(j) == Some(end));
    if !needed {
        return false;
    }
    let idx = instructions.len();
    instructions.push(Instruction::invalid());
    flat.pc_to_index.insert(end, idx);
    flat.index_to_pc.push(end);
    true
}

/// Replaces each jump's offset operand with a label on its target.
pub fn resolve_jumps(instructions: &mut [Instruction], flat: &FlatCode, labels: &mut LabelTable) {
    for &idx in &flat.jumps {
        let pc = flat.raw[idx].pc;
        let target_idx = flat.jump_target(idx).and_then(|t| flat.index_of(t));
        let Some(target_idx) = target_idx else {
            error!(
                pc,
                offset = flat.raw[idx].jump_offset(),
                "jump target is out of bounds or inside an instruction"
            );
            continue;
        };
        let label = labels.jump_label(target_idx);
        let offset = instructions[idx]
            .operands
            .iter_mut()
            .find(|op| matches!(op, Operand::Imm(_)));
        if let Some(op) = offset {
            *op = Operand::Label(label);
        }
    }
}

fn boundary_index(flat: &FlatCode, pc: u32, allow_end: bool, what: &str) -> Option<usize> {
    match flat.index_of(pc) {
        Some(idx) if allow_end || idx < flat.real_len() => Some(idx),
        _ => {
            error!(pc, code_size = flat.code_size, "invalid {what} offset");
            None
        }
    }
}

/// Labels try and handler boundaries and builds one catch block per clause.
pub fn resolve_exceptions(
    tries: &[TryRegion],
    flat: &FlatCode,
    labels: &mut LabelTable,
) -> Vec<CatchBlock> {
    let mut blocks = Vec::new();
    for (t, region) in tries.iter().enumerate() {
        let (Some(begin), Some(end)) = (
            boundary_index(flat, region.start_pc, false, "try begin"),
            boundary_index(flat, region.end_pc, true, "try end"),
        ) else {
            continue;
        };
        let try_begin_label = labels.label_or_insert(begin, || format!("try_begin_label_{t}"));
        let try_end_label = labels.label_or_insert(end, || format!("try_end_label_{t}"));

        for (c, clause) in region.catches.iter().enumerate() {
            let Some(handler) = boundary_index(flat, clause.begin_pc, false, "handler begin") else {
                continue;
            };
            let handler_end = match clause.end_pc {
                Some(pc) => match boundary_index(flat, pc, true, "handler end") {
                    Some(idx) => Some(idx),
                    None => continue,
                },
                None => None,
            };
            let catch_begin_label =
                labels.label_or_insert(handler, || format!("handler_begin_label_{t}_{c}"));
            let catch_end_label =
                handler_end.map(|idx| {
                    labels.label_or_insert(idx, || format!("handler_end_label_{t}_{c}"))
                });
            blocks.push(CatchBlock {
                exception_record: clause.exception.clone(),
                try_begin_label: try_begin_label.clone(),
                try_end_label: try_end_label.clone(),
                catch_begin_label,
                catch_end_label,
            });
        }
    }
    blocks
}

/// Value active at each pc for an ordered `(start_pc, value)` table; the
/// cursor only moves forward.
pub fn active_values(pcs: &[u32], table: &[(u32, u32)]) -> Vec<Option<u32>> {
    let mut out = Vec::with_capacity(pcs.len());
    let mut cursor = 0usize;
    let mut active = None;
    for &pc in pcs {
        while cursor < table.len() && table[cursor].0 <= pc {
            active = Some(table[cursor].1);
            cursor += 1;
        }
        out.push(active);
    }
    out
}

pub fn project_debug(
    instructions: &mut [Instruction],
    pcs: &[u32],
    lines: &[(u32, u32)],
    columns: &[(u32, u32)],
) {
    let line_values = active_values(pcs, lines);
    let column_values = active_values(pcs, columns);
    for ((insn, line), column) in instructions.iter_mut().zip(line_values).zip(column_values) {
        insn.line = line;
        insn.column = column;
    }
}
