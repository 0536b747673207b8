use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root(crate_dir: &Path) -> PathBuf {
    crate_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("crate directory should be <root>/crates/<name>")
        .to_path_buf()
}

fn take_until_paren_close(s: &str) -> Option<&str> {
    let s = s.trim();
    let j = s.rfind(')')?;
    Some(s[..j].trim())
}

fn parse_byte(s: &str) -> u8 {
    let s = s.trim();
    match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16).expect("hex byte"),
        None => s.parse().expect("decimal byte"),
    }
}

fn operand_variant(tok: &str) -> &'static str {
    match tok {
        "v4" => "V4",
        "v8" => "V8",
        "v16" => "V16",
        "imm4" => "Imm4",
        "imm8" => "Imm8",
        "imm16" => "Imm16",
        "imm32" => "Imm32",
        "imm64" => "Imm64",
        "simm8" => "SImm8",
        "simm16" => "SImm16",
        "simm32" => "SImm32",
        "fimm64" => "FImm64",
        "string_id16" => "StringId16",
        "method_id16" => "MethodId16",
        "literal_id16" => "LiteralId16",
        "field_id16" => "FieldId16",
        other => panic!("unknown operand kind `{other}` in ecmascript.def"),
    }
}

struct Def {
    mnemonic: String,
    prefix: u8,
    opcode: u8,
    operands: Vec<&'static str>,
    is_jump: bool,
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let root = workspace_root(&manifest_dir);

    let def_path = root.join("isa").join("ecmascript.def");
    println!("cargo:rerun-if-changed={}", def_path.display());

    let def_src = fs::read_to_string(&def_path).expect("read ecmascript.def");

    let mut prefixes: Vec<(String, u8)> = Vec::new();
    let mut defs: Vec<Def> = Vec::new();

    for line in def_src.lines() {
        let l = line.trim();
        if let Some(rest) = l.strip_prefix("PREFIX(") {
            let inner = match take_until_paren_close(rest) {
                Some(v) => v,
                None => continue,
            };
            let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
            if parts.len() != 2 {
                continue;
            }
            prefixes.push((parts[0].to_string(), parse_byte(parts[1])));
            continue;
        }

        let rest = match l.strip_prefix("DEF(") {
            Some(v) => v,
            None => continue,
        };
        let inner = match take_until_paren_close(rest) {
            Some(v) => v,
            None => continue,
        };
        let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
        if parts.len() != 5 {
            continue;
        }
        let operands = if parts[3] == "none" {
            Vec::new()
        } else {
            parts[3].split_whitespace().map(operand_variant).collect()
        };
        defs.push(Def {
            mnemonic: parts[0].to_string(),
            prefix: parse_byte(parts[1]),
            opcode: parse_byte(parts[2]),
            operands,
            is_jump: parts[4] == "jump",
        });
    }

    let mut primary = vec![0u16; 256];
    let mut prefixed = vec![vec![0u16; 256]; prefixes.len()];
    for (i, d) in defs.iter().enumerate() {
        let slot = if d.prefix == 0 {
            &mut primary[d.opcode as usize]
        } else {
            let p = prefixes
                .iter()
                .position(|(_, b)| *b == d.prefix)
                .unwrap_or_else(|| {
                    panic!("{} uses undeclared prefix 0x{:02x}", d.mnemonic, d.prefix)
                });
            &mut prefixed[p][d.opcode as usize]
        };
        if *slot != 0 {
            panic!("duplicate opcode 0x{:02x} 0x{:02x}", d.prefix, d.opcode);
        }
        *slot = (i + 1) as u16;
    }
    for (name, b) in &prefixes {
        if primary[*b as usize] != 0 {
            panic!("prefix {name} collides with a single-byte opcode");
        }
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let out_path = out_dir.join("isa_tables.rs");

    let mut out = String::new();

    out.push_str("pub const PREFIXES: &[(&str, u8)] = &[\n");
    for (name, b) in &prefixes {
        out.push_str(&format!("    (\"{name}\", 0x{b:02x}),\n"));
    }
    out.push_str("];\n\n");

    out.push_str("pub const OPCODE_INFO: &[OpInfo] = &[\n");
    for d in &defs {
        let ops: Vec<String> = d.operands.iter().map(|o| format!("OperandKind::{o}")).collect();
        out.push_str(&format!(
            concat!(
                "    OpInfo {{ mnemonic: \"{}\", prefix: 0x{:02x}, opcode: 0x{:02x}, ",
                "operands: &[{}], is_jump: {} }},\n"
            ),
            d.mnemonic,
            d.prefix,
            d.opcode,
            ops.join(", "),
            d.is_jump
        ));
    }
    out.push_str("];\n\n");

    let row = |r: &[u16]| -> String {
        r.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
    };
    out.push_str(&format!(
        "pub const PRIMARY_INDEX: [u16; 256] = [{}];\n\n",
        row(primary.as_slice())
    ));
    out.push_str(&format!("pub const PREFIXED_INDEX: [[u16; 256]; {}] = [\n", prefixes.len()));
    for r in &prefixed {
        out.push_str(&format!("    [{}],\n", row(r.as_slice())));
    }
    out.push_str("];\n");

    fs::write(out_path, out).expect("write generated isa tables");
}
