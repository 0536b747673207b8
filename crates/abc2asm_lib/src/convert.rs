//! Orchestration: walks the class index and drives every other component.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::{debug, error, warn};

use crate::code::{
    CatchRegion, LabelTable, TryRegion, decode_body, ensure_end_instruction, project_debug,
    resolve_exceptions, resolve_jumps,
};
use crate::error::{Abc2AsmError, Result};
use crate::file::{
    ACC_FINAL, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC, AbcFile, CodeData, DebugInfo,
    EntityId, FieldType, RawFieldValue, SourceLanguage,
};
use crate::literals::LiteralWorklist;
use crate::naming::NameCache;
use crate::program::{
    Field, Function, LocalVariable, MethodInfo, Program, Record, RecordInfo, ScalarValue,
};
use crate::types::{FieldValueKind, Type, TypeId, field_scalar_type, primitive_type, reference_type};
use crate::ConvertOptions;

const REFERENCE_TYPE_CODE: u8 = 0x0d;
/// Frame size limit on the argument count of a dynamic function.
const MAX_ARG_NUM: u32 = 0xffff;

const MODULE_REQUEST_PHASE_FIELD: &str = "moduleRequestPhaseIdx";
const TYPE_SUMMARY_FIELD: &str = "typeSummaryOffset";
const SCOPE_NAMES_FIELD: &str = "scopeNames";
const SCOPE_NAMES_RECORD: &str = "_ESScopeNamesRecord";

/// Conversion context: owns every cache and the program being built.
pub struct Converter<'f, F: AbcFile> {
    pub(crate) file: &'f F,
    pub(crate) names: NameCache,
    pub(crate) program: Program,
    pub(crate) language: Option<SourceLanguage>,
    pub(crate) literals: LiteralWorklist,
    pub(crate) module_ids: HashSet<EntityId>,
    pub(crate) phase_ids: HashSet<EntityId>,
    /// Fields of foreign records seen through instruction operands, keyed by
    /// owning record name.
    pub(crate) external_fields: BTreeMap<String, Vec<Field>>,
    seen_methods: HashSet<EntityId>,
    method_queue: VecDeque<EntityId>,
    verbose: bool,
}

/// Reconstructs the whole program contained in `file`.
pub fn convert<F: AbcFile>(file: &F, options: &ConvertOptions) -> Result<Program> {
    Converter::new(file, options).run()
}

impl<'f, F: AbcFile> Converter<'f, F> {
    pub fn new(file: &'f F, options: &ConvertOptions) -> Self {
        Self {
            file,
            names: NameCache::new(options.bundle_name.clone()),
            program: Program::default(),
            language: None,
            literals: LiteralWorklist::default(),
            module_ids: HashSet::new(),
            phase_ids: HashSet::new(),
            external_fields: BTreeMap::new(),
            seen_methods: HashSet::new(),
            method_queue: VecDeque::new(),
            verbose: options.verbose,
        }
    }

    pub fn run(mut self) -> Result<Program> {
        let file = self.file;
        debug!("getting records");
        for class_id in file.classes()? {
            skip_malformed_descriptor(self.add_record(class_id), class_id)?;
            self.drain_methods()?;
        }

        debug!("getting literal arrays");
        for id in file.literal_arrays()? {
            if !self.phase_ids.contains(&id) {
                self.register_literal_array(id, "");
            }
        }
        self.drain_literal_arrays()?;
        self.merge_external_fields()?;

        self.program.language = self.language.unwrap_or_default();
        self.program.strings = self.names.into_strings();
        Ok(self.program)
    }

    fn record_language(&mut self, declared: Option<SourceLanguage>, name: &str) -> SourceLanguage {
        let language = declared.or(self.language).unwrap_or_default();
        match self.language {
            None => self.language = Some(language),
            Some(file_language) if file_language != language => {
                warn!(
                    record = name,
                    record_language = language.as_str(),
                    file_language = file_language.as_str(),
                    "record language differs from the file language"
                );
            }
            Some(_) => {}
        }
        language
    }

    pub(crate) fn add_record(&mut self, class_id: EntityId) -> Result<()> {
        let file = self.file;
        if class_id.offset() >= file.file_size() {
            error!(offset = %class_id, size = file.file_size(), "class offset is out of bounds");
            return Err(Abc2AsmError::OffsetOutOfBounds {
                offset: class_id.offset(),
                size: file.file_size(),
            });
        }
        let name = self.names.record_name(file, class_id)?;
        debug!(record = name, "getting record");

        if file.is_external(class_id) {
            let mut record = Record::new(name, self.language.unwrap_or_default());
            record.metadata.set_attribute("external");
            return self.program.insert_record(record);
        }

        let class = file.class(class_id)?;
        let language = self.record_language(class.source_lang, &name);
        let mut record = Record::new(name.clone(), language);
        if language != SourceLanguage::EcmaScript {
            if let Some(access) = access_name(class.access_flags) {
                record.metadata.set_value("access.record", access);
            }
            if class.access_flags & ACC_FINAL != 0 {
                record.metadata.set_attribute("final");
            }
        }
        if let Some(source) = class.source_file {
            record.source_file = Some(file.string_data(source)?);
        }
        for &field_id in &class.fields {
            let field = self.convert_field(field_id, &name, language)?;
            record.fields.push(field);
        }
        record.annotations = self.record_annotations(&class.annotations, &name)?;
        if self.verbose {
            record.info = Some(RecordInfo {
                offset: class_id.offset(),
                field_offsets: class.fields.iter().map(|f| f.offset()).collect(),
            });
        }
        self.program.insert_record(record)?;

        for &method_id in &class.methods {
            self.enqueue_method(method_id);
        }
        Ok(())
    }

    /// Type named by a descriptor, with record names going through the cache.
    fn descriptor_type(&mut self, id: EntityId) -> Result<Type> {
        let file = self.file;
        let mut ty = reference_type(&file.string_data(id)?)?;
        if ty.id == TypeId::Reference && !ty.is_array() {
            ty.name = self.names.record_name(file, id)?;
        }
        Ok(ty)
    }

    pub(crate) fn convert_field(
        &mut self,
        field_id: EntityId,
        record: &str,
        language: SourceLanguage,
    ) -> Result<Field> {
        let file = self.file;
        let data = file.field(field_id)?;
        let name = file.string_data(data.name_id)?;
        let ty = match data.ty {
            FieldType::Primitive(code) => primitive_type(code)?,
            FieldType::Reference(id) => self.descriptor_type(id)?,
        };
        let mut field = Field {
            name,
            ty,
            metadata: Default::default(),
            value: None,
        };
        if file.is_external(field_id) {
            field.metadata.set_attribute("external");
        }
        if data.access_flags & ACC_STATIC != 0 {
            field.metadata.set_attribute("static");
        }
        if let Some(raw) = data.value {
            field.value = Some(self.field_value(&field, record, language, raw)?);
        }
        Ok(field)
    }

    fn field_value(
        &mut self,
        field: &Field,
        record: &str,
        language: SourceLanguage,
        raw: RawFieldValue,
    ) -> Result<ScalarValue> {
        let file = self.file;
        let word = raw.as_u32();
        let value = match field_scalar_type(&field.name, &field.ty)? {
            FieldValueKind::U1 => ScalarValue::U1(word != 0),
            FieldValueKind::U8 => ScalarValue::U8(word as u8),
            FieldValueKind::F64 => ScalarValue::F64(file.f64_at(EntityId(word))?),
            FieldValueKind::String => ScalarValue::Str(self.names.string_of(file, EntityId(word))?),
            FieldValueKind::LiteralArray => {
                ScalarValue::LiteralArray(self.register_literal_array(EntityId(word), record))
            }
            FieldValueKind::U32 => {
                let id = EntityId(word);
                if field.name == MODULE_REQUEST_PHASE_FIELD {
                    self.phase_ids.insert(id);
                } else if field.name == TYPE_SUMMARY_FIELD
                    || field.name == SCOPE_NAMES_FIELD
                    || record == SCOPE_NAMES_RECORD
                {
                    self.register_literal_array(id, record);
                } else if language == SourceLanguage::EcmaScript {
                    self.module_ids.insert(id);
                    self.register_literal_array(id, record);
                }
                ScalarValue::U32(word)
            }
        };
        Ok(value)
    }

    /// Queues a method for reconstruction unless it was seen before.
    pub(crate) fn enqueue_method(&mut self, method_id: EntityId) {
        if self.seen_methods.insert(method_id) {
            self.method_queue.push_back(method_id);
        }
    }

    pub(crate) fn drain_methods(&mut self) -> Result<()> {
        while let Some(method_id) = self.method_queue.pop_front() {
            skip_malformed_descriptor(self.add_function(method_id), method_id)?;
        }
        Ok(())
    }

    fn add_function(&mut self, method_id: EntityId) -> Result<()> {
        let file = self.file;
        let method = file.method(method_id)?;
        let record = self.names.record_name(file, method.class_id)?;
        let name = self.names.function_name(file, method_id)?;
        debug!(function = name, "getting method");

        let language = method.source_lang.or(self.language).unwrap_or_default();
        let mut function = Function::new(name, language);
        let external = file.is_external(method_id);
        if external {
            function.metadata.set_attribute("external");
        }
        match file.string_data(method.name_id)?.as_str() {
            ".ctor" => function.metadata.set_attribute("ctor"),
            ".cctor" => function.metadata.set_attribute("cctor"),
            _ => {}
        }
        if method.access_flags & ACC_STATIC != 0 {
            function.metadata.set_attribute("static");
        } else {
            function.params.push(Type::record(record.clone()));
        }
        if language != SourceLanguage::EcmaScript {
            if let Some(access) = access_name(method.access_flags) {
                function.metadata.set_value("access.function", access);
            }
        }

        let code = match method.code_id {
            Some(code_id) => Some(file.code(code_id)?),
            None => {
                if !external {
                    warn!(function = function.name, "method has no code");
                }
                None
            }
        };

        match &method.proto {
            Some(proto) => {
                let mut refs = proto.ref_types.iter();
                let mut types = Vec::with_capacity(proto.shorty.len());
                for &type_code in &proto.shorty {
                    let ty = if type_code == REFERENCE_TYPE_CODE {
                        let id = *refs.next().ok_or_else(|| {
                            Abc2AsmError::InvalidDescriptor(format!(
                                "proto of {} lacks a reference type",
                                function.name
                            ))
                        })?;
                        self.descriptor_type(id)?
                    } else {
                        primitive_type(type_code)?
                    };
                    types.push(ty);
                }
                let mut types = types.into_iter();
                function.return_type = types.next().unwrap_or_else(Type::any);
                function.params.extend(types);
            }
            None => {
                function.return_type = Type::any();
                let num_args = code.as_ref().map_or(0, |c| c.num_args);
                if num_args > MAX_ARG_NUM {
                    error!(
                        function = function.name,
                        num_args,
                        max = MAX_ARG_NUM,
                        "argument count exceeds the frame limit"
                    );
                } else {
                    function.params.extend((0..num_args).map(|_| Type::any()));
                }
            }
        }

        // the body must not be translated for a signature that already exists
        if self.program.functions.contains_key(&function.signature()) {
            debug!(method = %method_id, "function signature already present");
            return Ok(());
        }

        let mut pcs = Vec::new();
        if let Some(code) = &code {
            function.regs_num = code.num_vregs;
            pcs = self.build_body(&mut function, method_id, &record, code)?;
        }
        let debug_info = file.debug_info(method_id)?;
        if let Some(info) = &debug_info {
            project_debug(&mut function.instructions, &pcs, &info.line_table, &info.column_table);
            function.source_file = info.source_file.clone();
            function.source_code = info.source_code.clone();
            function.local_variables = info
                .local_variables
                .iter()
                .map(|v| LocalVariable {
                    name: v.name.clone(),
                    signature: v.signature.clone(),
                    signature_type: v.signature_type.clone(),
                    reg: v.reg,
                    start: v.start_offset,
                    length: v.end_offset.saturating_sub(v.start_offset),
                })
                .collect();
        }
        if self.verbose {
            let code_size = code.as_ref().map_or(0, |c| c.instructions.len() as u32);
            function.info = Some(method_info(
                &function,
                method_id,
                method.code_id,
                code_size,
                debug_info.as_ref(),
            ));
        }

        self.annotate_function(&mut function, &method.annotations, &record)?;
        self.program.insert_function(function);
        Ok(())
    }

    /// Decodes and translates one body, then resolves jumps and exception
    /// regions into labels. Returns the pc of every real instruction.
    fn build_body(
        &mut self,
        function: &mut Function,
        method_id: EntityId,
        record: &str,
        code: &CodeData<'_>,
    ) -> Result<Vec<u32>> {
        let mut flat = decode_body(code.instructions)?;
        let mut instructions = Vec::with_capacity(flat.raw.len() + 1);
        for raw in &flat.raw {
            instructions.push(self.translate(raw, method_id, record)?);
        }

        let tries = self.try_regions(method_id, code)?;
        ensure_end_instruction(&mut instructions, &mut flat, &tries);

        let mut labels = LabelTable::default();
        resolve_jumps(&mut instructions, &flat, &mut labels);
        function.catch_blocks = resolve_exceptions(&tries, &flat, &mut labels);
        labels.apply(&mut instructions);
        function.instructions = instructions;

        let mut pcs = flat.index_to_pc;
        pcs.truncate(flat.raw.len());
        Ok(pcs)
    }

    fn try_regions(&mut self, method_id: EntityId, code: &CodeData<'_>) -> Result<Vec<TryRegion>> {
        let file = self.file;
        let mut regions = Vec::with_capacity(code.tries.len());
        for t in &code.tries {
            let mut catches = Vec::with_capacity(t.catches.len());
            let Some(end_pc) = t.start_pc.checked_add(t.length) else {
                error!(start_pc = t.start_pc, length = t.length, "try block end overflows");
                continue;
            };
            for c in &t.catches {
                let end_pc = match c.code_size {
                    0 => None,
                    size => match c.handler_pc.checked_add(size) {
                        Some(end) => Some(end),
                        None => {
                            error!(
                                handler_pc = c.handler_pc,
                                code_size = size,
                                "catch handler end overflows"
                            );
                            continue;
                        }
                    },
                };
                let exception = match c.type_idx {
                    Some(idx) => {
                        let class_id = file.resolve_class_index(method_id, idx)?;
                        self.names.record_name(file, class_id)?
                    }
                    None => String::new(),
                };
                catches.push(CatchRegion {
                    exception,
                    begin_pc: c.handler_pc,
                    end_pc,
                });
            }
            regions.push(TryRegion {
                start_pc: t.start_pc,
                end_pc,
                catches,
            });
        }
        Ok(regions)
    }

    /// Adds buffered foreign fields to their records, skipping names the
    /// record already declares.
    pub(crate) fn merge_external_fields(&mut self) -> Result<()> {
        for (name, fields) in std::mem::take(&mut self.external_fields) {
            match self.program.records.get_mut(&name) {
                Some(record) => {
                    for field in fields {
                        if !record.fields.iter().any(|f| f.name == field.name) {
                            record.fields.push(field);
                        }
                    }
                }
                None => {
                    let mut record = Record::new(name, self.language.unwrap_or_default());
                    record.metadata.set_attribute("external");
                    record.fields = fields;
                    self.program.insert_record(record)?;
                }
            }
        }
        Ok(())
    }
}

/// Offsets and raw debug tables of one method. Named parameters follow the
/// locals in argument registers and cover the whole body.
fn method_info(
    function: &Function,
    method_id: EntityId,
    code_id: Option<EntityId>,
    code_size: u32,
    debug_info: Option<&DebugInfo>,
) -> MethodInfo {
    let mut info = MethodInfo {
        offset: method_id.offset(),
        code_offset: code_id.map(EntityId::offset),
        ..MethodInfo::default()
    };
    let Some(debug_info) = debug_info else {
        return info;
    };
    info.line_table = debug_info.line_table.clone();
    info.column_table = debug_info.column_table.clone();
    info.parameters = debug_info
        .parameter_names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let name = name.clone()?;
            let signature = function.params.get(i).map(Type::pandasm_name).unwrap_or_default();
            Some(LocalVariable {
                name,
                signature,
                signature_type: String::new(),
                reg: (function.regs_num as usize + i) as i32,
                start: 0,
                length: code_size,
            })
        })
        .collect();
    info
}

/// A malformed type descriptor drops only the entity being converted.
fn skip_malformed_descriptor(result: Result<()>, id: EntityId) -> Result<()> {
    match result {
        Err(Abc2AsmError::InvalidDescriptor(descriptor)) => {
            error!(entity = %id, descriptor, "skipping entity with malformed type descriptor");
            Ok(())
        }
        other => other,
    }
}

fn access_name(flags: u32) -> Option<&'static str> {
    if flags & ACC_PUBLIC != 0 {
        Some("public")
    } else if flags & ACC_PROTECTED != 0 {
        Some("protected")
    } else if flags & ACC_PRIVATE != 0 {
        Some("private")
    } else {
        None
    }
}
