//! Line-number program interpreter.

use crate::error::Result;
use crate::file::{DebugInfo, LocalVariableData};
use crate::reader::Reader;

const END_SEQUENCE: u8 = 0x00;
const ADVANCE_PC: u8 = 0x01;
const ADVANCE_LINE: u8 = 0x02;
const START_LOCAL: u8 = 0x03;
const START_LOCAL_EXTENDED: u8 = 0x04;
const END_LOCAL: u8 = 0x05;
const RESTART_LOCAL: u8 = 0x06;
const SET_PROLOGUE_END: u8 = 0x07;
const SET_EPILOGUE_BEGIN: u8 = 0x08;
const SET_FILE: u8 = 0x09;
const SET_SOURCE_CODE: u8 = 0x0a;
const SET_COLUMN: u8 = 0x0b;

const OPCODE_BASE: u8 = 0x0c;
const LINE_BASE: i32 = -4;
const LINE_RANGE: u32 = 15;

fn push_entry(table: &mut Vec<(u32, u32)>, pc: u32, value: u32) {
    match table.last_mut() {
        Some(last) if last.0 == pc => last.1 = value,
        Some(last) if last.1 == value => {}
        _ => table.push((pc, value)),
    }
}

/// Runs the line-number `program`; operands of the non-special opcodes come
/// from `constant_pool`, register operands from the program itself.
pub fn read_debug_info(
    line_start: u32,
    mut program: Reader<'_>,
    mut constant_pool: Reader<'_>,
    code_size: u32,
    string_at: &dyn Fn(u32) -> Result<Option<String>>,
) -> Result<DebugInfo> {
    let mut info = DebugInfo::default();
    let mut pc: u32 = 0;
    let mut line: i64 = line_start as i64;
    let mut open: Vec<LocalVariableData> = Vec::new();

    loop {
        let opcode = program.get_u8()?;
        match opcode {
            END_SEQUENCE => break,
            ADVANCE_PC => pc = pc.wrapping_add(constant_pool.get_uleb128()?),
            ADVANCE_LINE => line += constant_pool.get_sleb128()? as i64,
            START_LOCAL | START_LOCAL_EXTENDED => {
                let reg = program.get_sleb128()?;
                let name = string_at(constant_pool.get_uleb128()?)?.unwrap_or_default();
                let signature = string_at(constant_pool.get_uleb128()?)?.unwrap_or_default();
                let signature_type = if opcode == START_LOCAL_EXTENDED {
                    string_at(constant_pool.get_uleb128()?)?.unwrap_or_default()
                } else {
                    String::new()
                };
                open.push(LocalVariableData {
                    name,
                    signature,
                    signature_type,
                    reg,
                    start_offset: pc,
                    end_offset: code_size,
                });
            }
            END_LOCAL => {
                let reg = program.get_sleb128()?;
                if let Some(pos) = open.iter().rposition(|v| v.reg == reg) {
                    let mut var = open.remove(pos);
                    var.end_offset = pc;
                    info.local_variables.push(var);
                }
            }
            RESTART_LOCAL => {
                program.get_sleb128()?;
            }
            SET_PROLOGUE_END | SET_EPILOGUE_BEGIN => {}
            SET_FILE => info.source_file = string_at(constant_pool.get_uleb128()?)?,
            SET_SOURCE_CODE => info.source_code = string_at(constant_pool.get_uleb128()?)?,
            SET_COLUMN => {
                let column = constant_pool.get_uleb128()?;
                push_entry(&mut info.column_table, pc, column);
            }
            special => {
                let adjusted = (special - OPCODE_BASE) as u32;
                pc = pc.wrapping_add(adjusted / LINE_RANGE);
                line += (LINE_BASE + (adjusted % LINE_RANGE) as i32) as i64;
                push_entry(&mut info.line_table, pc, line.max(0) as u32);
            }
        }
    }

    info.local_variables.extend(open);
    info.local_variables.sort_by_key(|v| (v.start_offset, v.reg));
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_strings(_: u32) -> Result<Option<String>> {
        Ok(None)
    }

    fn special(pc_delta: u32, line_delta: i32) -> u8 {
        OPCODE_BASE + ((line_delta - LINE_BASE) as u32 + pc_delta * LINE_RANGE) as u8
    }

    #[test]
    fn special_opcodes_build_line_table() {
        let program = [special(0, 0), special(4, 1), special(6, 2), END_SEQUENCE];
        let info =
            read_debug_info(10, Reader::new(&program), Reader::new(&[]), 20, &no_strings).unwrap();
        assert_eq!(info.line_table, vec![(0, 10), (4, 11), (10, 13)]);
        assert!(info.column_table.is_empty());
    }

    #[test]
    fn advance_opcodes_read_constant_pool() {
        // advance_pc 3, advance_line -2, set_column 7, special(0, 0)
        let program = [ADVANCE_PC, ADVANCE_LINE, SET_COLUMN, special(0, 0), END_SEQUENCE];
        let pool = [0x03, 0x7e, 0x07];
        let info =
            read_debug_info(5, Reader::new(&program), Reader::new(&pool), 8, &no_strings).unwrap();
        assert_eq!(info.line_table, vec![(3, 3)]);
        assert_eq!(info.column_table, vec![(3, 7)]);
    }

    #[test]
    fn locals_are_closed_at_end_local_or_code_end() {
        let program = [
            START_LOCAL,
            0x00,
            special(2, 0),
            END_LOCAL,
            0x00,
            START_LOCAL,
            0x01,
            END_SEQUENCE,
        ];
        let pool = [0x00, 0x00, 0x00, 0x00];
        let info =
            read_debug_info(1, Reader::new(&program), Reader::new(&pool), 9, &no_strings).unwrap();
        assert_eq!(info.local_variables.len(), 2);
        let ranges: Vec<(u32, u32)> = info
            .local_variables
            .iter()
            .map(|v| (v.start_offset, v.end_offset))
            .collect();
        assert_eq!(ranges[0], (0, 2));
        assert_eq!(info.local_variables[1].reg, 1);
        assert_eq!(ranges[1], (2, 9));
    }
}
