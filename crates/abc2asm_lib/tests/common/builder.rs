//! Writes small ABC containers for tests.
//!
//! Every entity lives in one region spanning the whole file. The region's
//! method table doubles as the operand table for string, method and literal
//! operands; no proto table is written, so methods decode as dynamic
//! functions.

#![allow(dead_code)]

pub const HEADER_SIZE: usize = 60;

pub const TAG_VALUE: u8 = 0x00;
pub const TAG_BOOL: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_DOUBLE: u8 = 0x04;
pub const TAG_STRING: u8 = 0x05;
pub const TAG_METHOD: u8 = 0x06;
pub const TAG_ARRAY_I32: u8 = 0x10;
pub const TAG_LITERAL_ARRAY: u8 = 0x18;

pub const ACC_PUBLIC: u32 = 0x0001;
pub const ACC_STATIC: u32 = 0x0008;

pub const LANG_ECMASCRIPT: u8 = 0;
pub const LANG_PANDA_ASSEMBLY: u8 = 1;

/// Type code of `u32`, stored in the class table in place of a class offset.
pub const TYPE_U32: u32 = 0x08;
pub const TYPE_I32: u32 = 0x07;

#[derive(Debug, Clone, Copy)]
pub enum Lit {
    Bool(bool),
    Int(i32),
    Double(f64),
    /// String or method offset, or any other 32-bit entity reference.
    Offset(u32),
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Int(i32),
    Word(u32),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: u32,
    /// Class-table slot holding the type (a primitive code or a class offset).
    pub type_slot: u16,
    pub access: u32,
    pub value: Option<FieldValue>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodSpec {
    pub name: u32,
    pub access: u32,
    pub code: Option<u32>,
    pub debug_info: Option<u32>,
    pub annotations: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassSpec<'a> {
    pub descriptor: &'a str,
    pub access: u32,
    pub source_lang: Option<u8>,
    pub source_file: Option<u32>,
    pub annotations: Vec<u32>,
    pub fields: Vec<FieldSpec>,
    pub methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone)]
pub struct ClassOffsets {
    pub class: u32,
    pub slot: u16,
    pub fields: Vec<u32>,
    pub methods: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct CatchSpec {
    /// Class-table slot of the exception type, `None` for catch-all.
    pub type_slot: Option<u16>,
    pub handler_pc: u32,
    pub code_size: u32,
}

#[derive(Debug, Clone)]
pub struct TrySpec {
    pub start_pc: u32,
    pub length: u32,
    pub catches: Vec<CatchSpec>,
}

pub fn uleb(out: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(out: &mut Vec<u8>, mut v: i32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[derive(Debug)]
pub struct AbcBuilder {
    buf: Vec<u8>,
    classes: Vec<u32>,
    literal_arrays: Vec<u32>,
    lnps: Vec<u32>,
    class_table: Vec<u32>,
    entity_table: Vec<u32>,
    field_table: Vec<u32>,
    foreign: (u32, u32),
}

impl Default for AbcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AbcBuilder {
    pub fn new() -> Self {
        Self {
            buf: vec![0; HEADER_SIZE],
            classes: Vec::new(),
            literal_arrays: Vec::new(),
            lnps: Vec::new(),
            class_table: Vec::new(),
            entity_table: Vec::new(),
            field_table: Vec::new(),
            foreign: (0, 0),
        }
    }

    pub fn pos(&self) -> u32 {
        self.buf.len() as u32
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn uleb(&mut self, v: u32) {
        uleb(&mut self.buf, v);
    }

    /// ASCII string item; returns its offset.
    pub fn string(&mut self, s: &str) -> u32 {
        let off = self.pos();
        self.uleb(((s.len() as u32) << 1) | 1);
        self.buf.extend_from_slice(s.as_bytes());
        self.u8(0);
        off
    }

    pub fn raw(&mut self, bytes: &[u8]) -> u32 {
        let off = self.pos();
        self.buf.extend_from_slice(bytes);
        off
    }

    pub fn f64(&mut self, v: f64) -> u32 {
        self.raw(&v.to_le_bytes())
    }

    /// Adds `off` to the operand table and returns its slot.
    pub fn entity_slot(&mut self, off: u32) -> u16 {
        self.entity_table.push(off);
        (self.entity_table.len() - 1) as u16
    }

    pub fn set_entity_slot(&mut self, slot: u16, off: u32) {
        self.entity_table[slot as usize] = off;
    }

    pub fn class_slot(&mut self, off: u32) -> u16 {
        self.class_table.push(off);
        (self.class_table.len() - 1) as u16
    }

    pub fn field_slot(&mut self, off: u32) -> u16 {
        self.field_table.push(off);
        (self.field_table.len() - 1) as u16
    }

    /// Marks `[start, end)` as the foreign region.
    pub fn foreign(&mut self, start: u32, end: u32) {
        self.foreign = (start, end - start);
    }

    /// Lists `off` in the header class index without writing anything.
    pub fn top_level_class(&mut self, off: u32) {
        self.classes.push(off);
    }

    pub fn top_level_literal_array(&mut self, off: u32) {
        self.literal_arrays.push(off);
    }

    pub fn code(&mut self, num_vregs: u32, num_args: u32, insns: &[u8], tries: &[TrySpec]) -> u32 {
        let off = self.pos();
        self.uleb(num_vregs);
        self.uleb(num_args);
        self.uleb(insns.len() as u32);
        self.uleb(tries.len() as u32);
        self.buf.extend_from_slice(insns);
        for t in tries {
            self.uleb(t.start_pc);
            self.uleb(t.length);
            self.uleb(t.catches.len() as u32);
            for c in &t.catches {
                self.uleb(c.type_slot.map_or(0, |s| s as u32 + 1));
                self.uleb(c.handler_pc);
                self.uleb(c.code_size);
            }
        }
        off
    }

    pub fn literal_array(&mut self, items: &[(u8, Lit)]) -> u32 {
        let off = self.pos();
        self.u32(items.len() as u32 * 2);
        for &(tag, value) in items {
            self.u8(tag);
            match value {
                Lit::Bool(b) => self.u8(b as u8),
                Lit::Int(v) => self.u32(v as u32),
                Lit::Double(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
                Lit::Offset(v) => self.u32(v),
            }
        }
        off
    }

    /// `i32` array blob: count then elements.
    pub fn i32_blob(&mut self, values: &[i32]) -> u32 {
        let off = self.pos();
        self.u32(values.len() as u32);
        for &v in values {
            self.u32(v as u32);
        }
        off
    }

    /// Module record with the given request string offsets; entries are
    /// `(kind, [name offsets], module index)`, kinds 0..5 in table order.
    pub fn module_record(&mut self, requests: &[u32], entries: &[(usize, Vec<u32>, u16)]) -> u32 {
        let off = self.pos();
        self.u32(requests.len() as u32);
        for &r in requests {
            self.u32(r);
        }
        for kind in 0..5 {
            let of_kind: Vec<&(usize, Vec<u32>, u16)> =
                entries.iter().filter(|e| e.0 == kind).collect();
            self.u32(of_kind.len() as u32);
            for (_, names, idx) in of_kind {
                for &n in names {
                    self.u32(n);
                }
                if kind != 2 {
                    self.u16(*idx);
                }
            }
        }
        off
    }

    /// Annotation item: `(element name offset, tag char, raw value)`.
    pub fn annotation(&mut self, class_off: u32, elements: &[(u32, u8, u32)]) -> u32 {
        let off = self.pos();
        self.u32(class_off);
        self.u16(elements.len() as u16);
        for &(name, _, value) in elements {
            self.u32(name);
            self.u32(value);
        }
        for &(_, tag, _) in elements {
            self.u8(tag);
        }
        off
    }

    /// Debug item plus its line-number program. `constant_pool` holds the
    /// operands of the program's non-special opcodes.
    pub fn debug_info(&mut self, line_start: u32, program: &[u8], constant_pool: &[u8]) -> u32 {
        self.debug_info_with_params(line_start, &[], program, constant_pool)
    }

    /// Like [`Self::debug_info`], naming each parameter by a string offset
    /// (0 for an unnamed one).
    pub fn debug_info_with_params(
        &mut self,
        line_start: u32,
        params: &[u32],
        program: &[u8],
        constant_pool: &[u8],
    ) -> u32 {
        let program_off = self.raw(program);
        self.lnps.push(program_off);
        let lnp_idx = (self.lnps.len() - 1) as u32;

        let off = self.pos();
        self.uleb(line_start);
        self.uleb(params.len() as u32);
        for &p in params {
            self.uleb(p);
        }
        self.uleb(constant_pool.len() as u32);
        self.buf.extend_from_slice(constant_pool);
        self.uleb(lnp_idx);
        off
    }

    /// Writes a class item with its fields and methods. The class is added to
    /// the header class index unless `top_level` is false.
    pub fn class(&mut self, spec: &ClassSpec<'_>, top_level: bool) -> ClassOffsets {
        let class = self.pos();
        let slot = self.class_slot(class);
        if top_level {
            self.classes.push(class);
        }
        let descriptor = spec.descriptor;
        self.string(descriptor);
        self.u32(0);
        self.uleb(spec.access);
        self.uleb(spec.fields.len() as u32);
        self.uleb(spec.methods.len() as u32);
        if let Some(lang) = spec.source_lang {
            self.u8(0x02);
            self.u8(lang);
        }
        for &a in &spec.annotations {
            self.u8(0x04);
            self.u32(a);
        }
        if let Some(sf) = spec.source_file {
            self.u8(0x07);
            self.u32(sf);
        }
        self.u8(0x00);

        let mut fields = Vec::new();
        for f in &spec.fields {
            fields.push(self.pos());
            self.u16(slot);
            self.u16(f.type_slot);
            self.u32(f.name);
            self.uleb(f.access);
            match &f.value {
                Some(FieldValue::Int(v)) => {
                    self.u8(0x01);
                    sleb(&mut self.buf, *v);
                }
                Some(FieldValue::Word(v)) => {
                    self.u8(0x02);
                    self.u32(*v);
                }
                None => {}
            }
            self.u8(0x00);
        }

        let mut methods = Vec::new();
        for m in &spec.methods {
            methods.push(self.pos());
            self.u16(slot);
            self.u16(0);
            self.u32(m.name);
            self.uleb(m.access);
            if let Some(code) = m.code {
                self.u8(0x01);
                self.u32(code);
            }
            if let Some(debug) = m.debug_info {
                self.u8(0x05);
                self.u32(debug);
            }
            for &a in &m.annotations {
                self.u8(0x06);
                self.u32(a);
            }
            self.u8(0x00);
        }
        ClassOffsets {
            class,
            slot,
            fields,
            methods,
        }
    }

    fn table(&mut self, entries: &[u32]) -> u32 {
        let off = self.pos();
        for &e in entries {
            self.u32(e);
        }
        off
    }

    pub fn finish(mut self) -> Vec<u8> {
        let classes = std::mem::take(&mut self.classes);
        let literal_arrays = std::mem::take(&mut self.literal_arrays);
        let lnps = std::mem::take(&mut self.lnps);
        let class_table = std::mem::take(&mut self.class_table);
        let entity_table = std::mem::take(&mut self.entity_table);
        let field_table = std::mem::take(&mut self.field_table);

        let class_idx_off = self.table(&classes);
        let lnp_idx_off = self.table(&lnps);
        let literal_idx_off = self.table(&literal_arrays);
        let class_table_off = self.table(&class_table);
        let entity_table_off = self.table(&entity_table);
        let field_table_off = self.table(&field_table);

        let index_section_off = self.pos();
        let region_fields = [
            0,
            0, // end, patched below
            class_table.len() as u32,
            class_table_off,
            entity_table.len() as u32,
            entity_table_off,
            field_table.len() as u32,
            field_table_off,
            0,
            0,
        ];
        for v in region_fields {
            self.u32(v);
        }
        let file_size = self.pos();
        let end_at = index_section_off as usize + 4;
        self.buf[end_at..end_at + 4].copy_from_slice(&file_size.to_le_bytes());

        let header = [
            0, // checksum
            u32::from_le_bytes(*b"\x0c\x00\x00\x00"),
            file_size,
            self.foreign.0,
            self.foreign.1,
            classes.len() as u32,
            class_idx_off,
            lnps.len() as u32,
            lnp_idx_off,
            literal_arrays.len() as u32,
            literal_idx_off,
            1,
            index_section_off,
        ];
        self.buf[..8].copy_from_slice(b"PANDA\0\0\0");
        for (i, v) in header.iter().enumerate() {
            let at = 8 + i * 4;
            self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        self.buf
    }
}
