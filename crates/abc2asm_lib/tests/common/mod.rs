#![allow(dead_code)]

pub mod builder;

use std::collections::HashSet;

use abc2asm_lib::program::{Function, Operand};
use abc2asm_lib::{ConvertOptions, Program, convert_bytes};

use self::builder::{AbcBuilder, ClassOffsets, ClassSpec, LANG_ECMASCRIPT, MethodSpec};

pub const GLOBAL_DESCRIPTOR: &str = "L_GLOBAL;";

pub fn convert(bytes: &[u8]) -> Program {
    convert_bytes(bytes, &ConvertOptions::default()).expect("conversion failed")
}

/// Every label is defined once, and every label that is used is defined.
pub fn assert_labels_consistent(function: &Function) {
    let mut defined = HashSet::new();
    for insn in &function.instructions {
        if let Some(label) = &insn.label {
            let fresh = defined.insert(label.clone());
            assert!(fresh, "{}: label {label} defined twice", function.name);
        }
    }
    let mut used: Vec<&String> = function
        .instructions
        .iter()
        .flat_map(|i| &i.operands)
        .filter_map(|op| match op {
            Operand::Label(l) => Some(l),
            _ => None,
        })
        .collect();
    for block in &function.catch_blocks {
        used.extend([&block.try_begin_label, &block.try_end_label, &block.catch_begin_label]);
        used.extend(&block.catch_end_label);
    }
    for label in used {
        assert!(defined.contains(label), "{}: label {label} is never defined", function.name);
    }
}

/// Static ECMAScript function on the global record.
pub fn es_method(name: u32, code: u32) -> MethodSpec {
    MethodSpec {
        name,
        access: builder::ACC_STATIC,
        code: Some(code),
        ..MethodSpec::default()
    }
}

pub fn global_class(b: &mut AbcBuilder, methods: Vec<MethodSpec>) -> ClassOffsets {
    b.class(
        &ClassSpec {
            descriptor: GLOBAL_DESCRIPTOR,
            source_lang: Some(LANG_ECMASCRIPT),
            methods,
            ..ClassSpec::default()
        },
        true,
    )
}

pub fn lo(slot: u16) -> u8 {
    slot.to_le_bytes()[0]
}

pub fn hi(slot: u16) -> u8 {
    slot.to_le_bytes()[1]
}
