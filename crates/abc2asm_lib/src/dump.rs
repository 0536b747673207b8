//! Text rendering of a reconstructed [`Program`].

use std::fmt::Write;

use crate::ConvertOptions;
use crate::naming::is_system_type;
use crate::program::{
    Annotation, CatchBlock, Field, Function, Instruction, LiteralArray, LiteralValue, LocalVariable,
    Metadata, Opcode, Operand, Program, Record, ScalarValue,
};

const SECTION_RULE: &str = "# ====================";

pub fn dump(program: &Program, options: &ConvertOptions) -> String {
    let mut out = String::new();
    if let Some(name) = &options.source_binary {
        let _ = writeln!(out, "# source binary: {name}\n");
    }
    let _ = writeln!(out, ".language {}\n", program.language.as_str());

    if !program.literal_arrays.is_empty() {
        section(&mut out, "LITERALS");
        for (name, array) in &program.literal_arrays {
            dump_literal_array(&mut out, name, array);
        }
    }

    let records: Vec<&Record> =
        program.records.values().filter(|r| !is_system_type(&r.name)).collect();
    if !records.is_empty() {
        section(&mut out, "RECORDS");
        for record in records {
            dump_record(&mut out, record);
        }
    }

    if !program.functions.is_empty() {
        section(&mut out, "METHODS");
        for function in program.functions.values() {
            dump_function(&mut out, function);
        }
    }

    if !options.skip_strings && !program.strings.is_empty() {
        section(&mut out, "STRING");
        for (offset, value) in &program.strings {
            let _ = writeln!(out, "[offset:0x{offset:x}, name_value:{value}]");
        }
    }
    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{SECTION_RULE}\n# {title}\n");
}

fn attributes(metadata: &Metadata) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let items: Vec<String> = metadata
        .attributes
        .iter()
        .cloned()
        .chain(metadata.values.iter().map(|(k, v)| format!("{k}={v}")))
        .collect();
    format!(" <{}>", items.join(", "))
}

fn hex(v: i64) -> String {
    if v < 0 { format!("-0x{:x}", v.unsigned_abs()) } else { format!("0x{v:x}") }
}

fn literal_value(value: &LiteralValue) -> String {
    match value {
        LiteralValue::Bool(b) => (*b as u8).to_string(),
        LiteralValue::U8(v) => v.to_string(),
        LiteralValue::I8(v) => v.to_string(),
        LiteralValue::U16(v) => v.to_string(),
        LiteralValue::I16(v) => v.to_string(),
        LiteralValue::U32(v) => v.to_string(),
        LiteralValue::I32(v) => v.to_string(),
        LiteralValue::U64(v) => v.to_string(),
        LiteralValue::I64(v) => v.to_string(),
        LiteralValue::F32(v) => format!("{v:?}"),
        LiteralValue::F64(v) => format!("{v:?}"),
        LiteralValue::Str(s) => format!("\"{s}\""),
        LiteralValue::Name(n) => n.clone(),
    }
}

fn dump_literal_array(out: &mut String, name: &str, array: &LiteralArray) {
    let _ = writeln!(out, ".array {name} {{");
    for lit in &array.literals {
        let _ = writeln!(out, "\t{} {}", lit.tag.name(), literal_value(&lit.value));
    }
    let _ = writeln!(out, "}}\n");
}

fn scalar(value: &ScalarValue) -> String {
    match value {
        ScalarValue::U1(b) => (*b as u8).to_string(),
        ScalarValue::U8(v) => format!("0x{v:x}"),
        ScalarValue::U32(v) => format!("0x{v:x}"),
        ScalarValue::F64(v) => format!("{v:?}"),
        ScalarValue::Str(s) => format!("\"{s}\""),
        ScalarValue::LiteralArray(name) => name.clone(),
    }
}

fn dump_field(out: &mut String, field: &Field, offset: Option<u32>) {
    let _ = write!(
        out,
        "\t{} {}{}",
        field.ty.pandasm_name(),
        field.name,
        attributes(&field.metadata)
    );
    if let Some(value) = &field.value {
        let _ = write!(out, " = {}", scalar(value));
    }
    if let Some(offset) = offset {
        let _ = write!(out, " # offset: 0x{offset:04x}");
    }
    out.push('\n');
}

fn dump_annotations(out: &mut String, annotations: &[Annotation]) {
    for a in annotations {
        let elements: Vec<String> = a
            .elements
            .iter()
            .map(|e| format!("{}:{}={}", e.name, e.value.type_name(), scalar(&e.value)))
            .collect();
        let _ = writeln!(out, "# annotation: {} {{ {} }}", a.name, elements.join(", "));
    }
}

fn dump_record(out: &mut String, record: &Record) {
    dump_annotations(out, &record.annotations);
    let _ = write!(out, ".record {}{}", record.name, attributes(&record.metadata));
    if record.metadata.has_attribute("external") && record.fields.is_empty() {
        out.push_str("\n\n");
        return;
    }
    out.push_str(" {");
    if let Some(info) = &record.info {
        let _ = write!(out, " # offset: 0x{:04x}, size: {}", info.offset, record.fields.len());
    }
    out.push('\n');
    for (i, field) in record.fields.iter().enumerate() {
        let offset = record.info.as_ref().and_then(|info| info.field_offsets.get(i).copied());
        dump_field(out, field, offset);
    }
    out.push_str("}\n");
    if let Some(source) = &record.source_file {
        let _ = writeln!(out, "# source_file: {source}");
    }
    out.push('\n');
}

fn register(r: u32, regs_num: u32) -> String {
    if r < regs_num { format!("v{r}") } else { format!("a{}", r - regs_num) }
}

fn operand(op: &Operand, regs_num: u32) -> String {
    match op {
        Operand::Reg(r) => register(u32::from(*r), regs_num),
        Operand::Imm(v) => hex(*v),
        Operand::FImm(v) => format!("{v:?}"),
        Operand::Str(s) => format!("\"{s}\""),
        Operand::Name(n) | Operand::Label(n) => n.clone(),
    }
}

fn dump_instruction(out: &mut String, insn: &Instruction, regs_num: u32) {
    if let Some(label) = &insn.label {
        let _ = writeln!(out, "{label}:");
    }
    let Opcode::Named(mnemonic) = &insn.opcode else {
        return;
    };
    out.push('\t');
    out.push_str(mnemonic);
    let ops: Vec<String> = insn.operands.iter().map(|op| operand(op, regs_num)).collect();
    if !ops.is_empty() {
        out.push(' ');
        out.push_str(&ops.join(", "));
    }
    match (insn.line, insn.column) {
        (Some(line), Some(column)) => {
            let _ = write!(out, " # line: {line}, column: {column}");
        }
        (Some(line), None) => {
            let _ = write!(out, " # line: {line}");
        }
        _ => {}
    }
    out.push('\n');
}

fn dump_catch(out: &mut String, block: &CatchBlock) {
    let directive = if block.exception_record.is_empty() {
        ".catchall".to_string()
    } else {
        format!(".catch {},", block.exception_record)
    };
    let _ = write!(
        out,
        "{directive} {}, {}, {}",
        block.try_begin_label, block.try_end_label, block.catch_begin_label
    );
    if let Some(end) = &block.catch_end_label {
        let _ = write!(out, ", {end}");
    }
    out.push('\n');
}

fn dump_function(out: &mut String, function: &Function) {
    dump_annotations(out, &function.annotations);
    if let Some(slots) = function.slots_num {
        let _ = writeln!(out, "# slots: {slots}");
    }
    if let Some(requests) = &function.concurrent_module_requests {
        let list: Vec<String> = requests.iter().map(u32::to_string).collect();
        let _ = writeln!(out, "# concurrent module requests: [{}]", list.join(", "));
    }
    if let Some(source) = &function.source_file {
        let _ = writeln!(out, "# source_file: {source}");
    }

    let params: Vec<String> = function
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} a{i}", p.pandasm_name()))
        .collect();
    let _ = write!(
        out,
        ".function {} {}({}){}",
        function.return_type.pandasm_name(),
        function.name,
        params.join(", "),
        attributes(&function.metadata)
    );
    if function.instructions.is_empty() && function.catch_blocks.is_empty() {
        if let Some(info) = &function.info {
            let _ = write!(out, " # offset: 0x{:04x}, <no code>", info.offset);
        }
        out.push_str("\n\n");
        return;
    }
    out.push_str(" {");
    if let Some(info) = &function.info {
        let _ = write!(out, " # offset: 0x{:04x}", info.offset);
        match info.code_offset {
            Some(code) => {
                let _ = write!(out, ", code offset: 0x{code:04x}");
            }
            None => out.push_str(", <no code>"),
        }
        out.push_str("\n#   CODE:");
    }
    out.push('\n');
    for insn in &function.instructions {
        dump_instruction(out, insn, function.regs_num);
    }
    if !function.catch_blocks.is_empty() {
        out.push('\n');
        for block in &function.catch_blocks {
            dump_catch(out, block);
        }
    }
    if let Some(info) = &function.info {
        dump_table(out, "LINE_NUMBER_TABLE", "line", &info.line_table);
        dump_table(out, "COLUMN_NUMBER_TABLE", "column", &info.column_table);
        let locals: Vec<&LocalVariable> =
            function.local_variables.iter().chain(&info.parameters).collect();
        dump_local_variables(out, &locals, function.regs_num);
    }
    out.push_str("}\n\n");
}

fn dump_table(out: &mut String, title: &str, what: &str, table: &[(u32, u32)]) {
    if table.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n#   {title}:");
    for (pc, value) in table {
        let _ = writeln!(out, "#\t{what} {value}: {pc}");
    }
}

fn local_register(reg: i32, regs_num: u32) -> String {
    match u32::try_from(reg) {
        Ok(r) => format!("{r}({})", register(r, regs_num)),
        Err(_) => "acc".to_string(),
    }
}

fn dump_local_variables(out: &mut String, locals: &[&LocalVariable], regs_num: u32) {
    if locals.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n#   LOCAL_VARIABLE_TABLE:");
    let _ = writeln!(out, "#\t Start   End  Register           Name   Signature");
    for local in locals {
        let end = local.start.saturating_add(local.length);
        let _ = write!(
            out,
            "#\t {:>5}  {:>4}  {:>8} {:>14}   {}",
            local.start,
            end,
            local_register(local.reg, regs_num),
            local.name,
            local.signature
        );
        if !local.signature_type.is_empty() && local.signature_type != local.signature {
            let _ = write!(out, " ({})", local.signature_type);
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceLanguage;
    use crate::program::{MethodInfo, RecordInfo};
    use crate::types::Type;

    #[test]
    fn registers_split_into_locals_and_arguments() {
        assert_eq!(operand(&Operand::Reg(1), 2), "v1");
        assert_eq!(operand(&Operand::Reg(2), 2), "a0");
        assert_eq!(operand(&Operand::Imm(-3), 0), "-0x3");
        assert_eq!(operand(&Operand::Str("a\\\"b".into()), 0), "\"a\\\"b\"");
    }

    #[test]
    fn function_with_labels_and_catch() {
        let mut f = Function::new("_GLOBAL.func_main_0", SourceLanguage::EcmaScript);
        f.params = vec![Type::any(), Type::any()];
        f.regs_num = 1;
        f.metadata.set_attribute("static");
        let mut first = Instruction::new("lda.str", vec![Operand::Str("hi".into())]);
        first.label = Some("try_begin_label_0".into());
        first.line = Some(3);
        let mut second = Instruction::new("sta", vec![Operand::Reg(0)]);
        second.label = Some("try_end_label_0".into());
        let mut end = Instruction::invalid();
        end.label = Some("handler_end_label_0_0".into());
        f.instructions = vec![first, second, end];
        f.catch_blocks = vec![CatchBlock {
            exception_record: String::new(),
            try_begin_label: "try_begin_label_0".into(),
            try_end_label: "try_end_label_0".into(),
            catch_begin_label: "try_end_label_0".into(),
            catch_end_label: Some("handler_end_label_0_0".into()),
        }];

        let mut out = String::new();
        dump_function(&mut out, &f);
        let expected = "\
.function any _GLOBAL.func_main_0(any a0, any a1) <static> {
try_begin_label_0:
\tlda.str \"hi\" # line: 3
try_end_label_0:
\tsta v0
handler_end_label_0_0:

.catchall try_begin_label_0, try_end_label_0, try_end_label_0, handler_end_label_0_0
}

";
        assert_eq!(out, expected);
    }

    #[test]
    fn verbose_info_adds_offsets_and_debug_tables() {
        let mut f = Function::new("_GLOBAL.foo", SourceLanguage::EcmaScript);
        f.params = vec![Type::any()];
        f.regs_num = 1;
        f.instructions = vec![Instruction::new("returnundefined", Vec::new())];
        f.local_variables = vec![LocalVariable {
            name: "x".into(),
            signature: "any".into(),
            signature_type: String::new(),
            reg: 0,
            start: 0,
            length: 1,
        }];
        f.info = Some(MethodInfo {
            offset: 0x40,
            code_offset: Some(0x1c),
            line_table: vec![(0, 7)],
            column_table: Vec::new(),
            parameters: vec![LocalVariable {
                name: "this".into(),
                signature: "any".into(),
                signature_type: String::new(),
                reg: 1,
                start: 0,
                length: 1,
            }],
        });

        let mut out = String::new();
        dump_function(&mut out, &f);
        let expected = "\
.function any _GLOBAL.foo(any a0) { # offset: 0x0040, code offset: 0x001c
#   CODE:
\treturnundefined

#   LINE_NUMBER_TABLE:
#\tline 7: 0

#   LOCAL_VARIABLE_TABLE:
#\t Start   End  Register           Name   Signature
#\t     0     1     0(v0)              x   any
#\t     0     1     1(a0)           this   any
}

";
        assert_eq!(out, expected);
    }

    #[test]
    fn verbose_record_lists_field_offsets() {
        let mut record = Record::new("Point", SourceLanguage::EcmaScript);
        record.fields = vec![Field {
            name: "x".into(),
            ty: Type::any(),
            metadata: Metadata::default(),
            value: None,
        }];
        record.info = Some(RecordInfo {
            offset: 0x120,
            field_offsets: vec![0x130],
        });
        let mut out = String::new();
        dump_record(&mut out, &record);
        let expected = ".record Point { # offset: 0x0120, size: 1\n\tany x # offset: 0x0130\n}\n\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn strings_section_can_be_skipped() {
        let mut program = Program::default();
        program.strings.insert(0x2a, "hello".into());
        let shown = dump(&program, &ConvertOptions::default());
        assert!(shown.contains("[offset:0x2a, name_value:hello]"));
        let hidden = dump(
            &program,
            &ConvertOptions {
                skip_strings: true,
                ..ConvertOptions::default()
            },
        );
        assert!(!hidden.contains("name_value"));
        assert!(hidden.starts_with(".language ECMAScript\n"));
    }
}
