//! Binary ABC (Panda container) reader.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::debug::read_debug_info;
use crate::error::{Abc2AsmError, Result};
use crate::file::*;
use crate::reader::Reader;

pub const MAGIC: &[u8; 8] = b"PANDA\0\0\0";
pub const HEADER_SIZE: usize = 60;
const REGION_HEADER_SIZE: usize = 40;

mod class_tag {
    pub const NOTHING: u8 = 0x00;
    pub const INTERFACES: u8 = 0x01;
    pub const SOURCE_LANG: u8 = 0x02;
    pub const RUNTIME_ANNOTATION: u8 = 0x03;
    pub const ANNOTATION: u8 = 0x04;
    pub const RUNTIME_TYPE_ANNOTATION: u8 = 0x05;
    pub const TYPE_ANNOTATION: u8 = 0x06;
    pub const SOURCE_FILE: u8 = 0x07;
}

mod field_tag {
    pub const NOTHING: u8 = 0x00;
    pub const INT_VALUE: u8 = 0x01;
    pub const VALUE: u8 = 0x02;
    pub const RUNTIME_ANNOTATIONS: u8 = 0x03;
    pub const ANNOTATIONS: u8 = 0x04;
    pub const RUNTIME_TYPE_ANNOTATION: u8 = 0x05;
    pub const TYPE_ANNOTATION: u8 = 0x06;
}

mod method_tag {
    pub const NOTHING: u8 = 0x00;
    pub const CODE: u8 = 0x01;
    pub const SOURCE_LANG: u8 = 0x02;
    pub const RUNTIME_ANNOTATION: u8 = 0x03;
    pub const RUNTIME_PARAM_ANNOTATION: u8 = 0x04;
    pub const DEBUG_INFO: u8 = 0x05;
    pub const ANNOTATION: u8 = 0x06;
    pub const PARAM_ANNOTATION: u8 = 0x07;
    pub const TYPE_ANNOTATION: u8 = 0x08;
    pub const RUNTIME_TYPE_ANNOTATION: u8 = 0x09;
}

/// Largest type code that may appear in place of a class offset.
const MAX_PRIMITIVE_TYPE_CODE: u32 = 0x0e;
/// Shorty code for a reference type.
const REFERENCE_TYPE_CODE: u8 = 0x0d;

#[derive(Debug, Clone, Copy)]
struct Header {
    checksum: u32,
    version: [u8; 4],
    file_size: u32,
    foreign_off: u32,
    foreign_size: u32,
    num_classes: u32,
    class_idx_off: u32,
    num_lnps: u32,
    lnp_idx_off: u32,
    num_literalarrays: u32,
    literalarray_idx_off: u32,
    num_indexes: u32,
    index_section_off: u32,
}

#[derive(Debug, Clone, Copy)]
struct RegionHeader {
    start: u32,
    end: u32,
    class_idx_size: u32,
    class_idx_off: u32,
    method_idx_size: u32,
    method_idx_off: u32,
    field_idx_size: u32,
    field_idx_off: u32,
    proto_idx_size: u32,
    proto_idx_off: u32,
}

pub struct PandaFile<'a> {
    data: &'a [u8],
    header: Header,
    regions: Vec<RegionHeader>,
}

impl<'a> PandaFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Abc2AsmError::Eof { offset: data.len() });
        }
        if &data[..8] != MAGIC {
            return Err(Abc2AsmError::BadMagic);
        }
        let mut r = Reader::at(data, 8)?;
        let checksum = r.get_u32()?;
        let mut version = [0u8; 4];
        version.copy_from_slice(r.get_bytes(4)?);
        let header = Header {
            checksum,
            version,
            file_size: r.get_u32()?,
            foreign_off: r.get_u32()?,
            foreign_size: r.get_u32()?,
            num_classes: r.get_u32()?,
            class_idx_off: r.get_u32()?,
            num_lnps: r.get_u32()?,
            lnp_idx_off: r.get_u32()?,
            num_literalarrays: r.get_u32()?,
            literalarray_idx_off: r.get_u32()?,
            num_indexes: r.get_u32()?,
            index_section_off: r.get_u32()?,
        };
        debug!(
            version = ?header.version,
            checksum = header.checksum,
            file_size = header.file_size,
            classes = header.num_classes,
            "parsed abc header"
        );

        let mut r = Reader::at(data, header.index_section_off as usize)?;
        let mut regions =
            Vec::with_capacity(r.capacity_for(header.num_indexes, REGION_HEADER_SIZE));
        for _ in 0..header.num_indexes {
            regions.push(RegionHeader {
                start: r.get_u32()?,
                end: r.get_u32()?,
                class_idx_size: r.get_u32()?,
                class_idx_off: r.get_u32()?,
                method_idx_size: r.get_u32()?,
                method_idx_off: r.get_u32()?,
                field_idx_size: r.get_u32()?,
                field_idx_off: r.get_u32()?,
                proto_idx_size: r.get_u32()?,
                proto_idx_off: r.get_u32()?,
            });
        }

        Ok(Self { data, header, regions })
    }

    fn reader_at(&self, id: EntityId) -> Result<Reader<'a>> {
        let off = id.offset();
        if off as usize >= self.data.len() {
            return Err(Abc2AsmError::OffsetOutOfBounds {
                offset: off,
                size: self.data.len() as u32,
            });
        }
        Reader::at(self.data, off as usize)
    }

    fn region_for(&self, id: EntityId) -> Option<&RegionHeader> {
        let off = id.offset();
        self.regions.iter().find(|r| r.start <= off && off < r.end)
    }

    fn index_entry(
        &self,
        table_off: u32,
        table_size: u32,
        idx: u16,
        kind: &'static str,
        entity: EntityId,
    ) -> Result<EntityId> {
        if idx as u32 >= table_size {
            return Err(Abc2AsmError::InvalidIndex {
                kind,
                index: idx as u32,
                entity: entity.offset(),
            });
        }
        let mut r = Reader::at(self.data, table_off as usize + idx as usize * 4)?;
        Ok(EntityId(r.get_u32()?))
    }

    fn no_region(&self, kind: &'static str, idx: u16, entity: EntityId) -> Abc2AsmError {
        Abc2AsmError::InvalidIndex {
            kind,
            index: idx as u32,
            entity: entity.offset(),
        }
    }

    fn resolve_proto_index(&self, entity: EntityId, idx: u16) -> Result<EntityId> {
        let region = self.region_for(entity).ok_or_else(|| self.no_region("proto", idx, entity))?;
        self.index_entry(region.proto_idx_off, region.proto_idx_size, idx, "proto", entity)
    }

    fn offset_table(&self, off: u32, count: u32) -> Result<Vec<EntityId>> {
        let mut r = Reader::at(self.data, off as usize)?;
        let mut out = Vec::with_capacity(r.capacity_for(count, 4));
        for _ in 0..count {
            out.push(EntityId(r.get_u32()?));
        }
        Ok(out)
    }

    fn read_proto(&self, method_id: EntityId, proto_id: EntityId) -> Result<Proto> {
        let mut r = self.reader_at(proto_id)?;
        let mut shorty = Vec::new();
        let mut num_refs = 0usize;
        'outer: loop {
            let unit = r.get_u16()?;
            for i in 0..4 {
                let code = ((unit >> (i * 4)) & 0xf) as u8;
                if code == 0 {
                    break 'outer;
                }
                if code == REFERENCE_TYPE_CODE {
                    num_refs += 1;
                }
                shorty.push(code);
            }
        }
        let mut ref_types = Vec::with_capacity(num_refs);
        for _ in 0..num_refs {
            let idx = r.get_u16()?;
            ref_types.push(self.resolve_class_index(method_id, idx)?);
        }
        Ok(Proto { shorty, ref_types })
    }

    fn skip_string(r: &mut Reader<'_>) -> Result<()> {
        r.get_uleb128()?;
        r.get_mutf8()?;
        Ok(())
    }

    fn skip_field(&self, r: &mut Reader<'_>) -> Result<()> {
        r.skip(8)?;
        r.get_uleb128()?;
        loop {
            let tag = r.get_u8()?;
            match tag {
                field_tag::NOTHING => return Ok(()),
                field_tag::INT_VALUE => {
                    r.get_sleb128()?;
                }
                field_tag::VALUE
                | field_tag::RUNTIME_ANNOTATIONS
                | field_tag::ANNOTATIONS
                | field_tag::RUNTIME_TYPE_ANNOTATION
                | field_tag::TYPE_ANNOTATION => r.skip(4)?,
                other => {
                    return Err(Abc2AsmError::UnsupportedItemTag {
                        item: "field",
                        tag: other,
                        offset: r.pos() as u32 - 1,
                    });
                }
            }
        }
    }

    fn skip_method(&self, r: &mut Reader<'_>) -> Result<()> {
        r.skip(8)?;
        r.get_uleb128()?;
        loop {
            let tag = r.get_u8()?;
            match tag {
                method_tag::NOTHING => return Ok(()),
                method_tag::SOURCE_LANG => r.skip(1)?,
                method_tag::CODE
                | method_tag::RUNTIME_ANNOTATION
                | method_tag::RUNTIME_PARAM_ANNOTATION
                | method_tag::DEBUG_INFO
                | method_tag::ANNOTATION
                | method_tag::PARAM_ANNOTATION
                | method_tag::TYPE_ANNOTATION
                | method_tag::RUNTIME_TYPE_ANNOTATION => r.skip(4)?,
                other => {
                    return Err(Abc2AsmError::UnsupportedItemTag {
                        item: "method",
                        tag: other,
                        offset: r.pos() as u32 - 1,
                    });
                }
            }
        }
    }

    fn lnp_offset(&self, lnp_idx: u32) -> Result<usize> {
        if lnp_idx >= self.header.num_lnps {
            return Err(Abc2AsmError::InvalidIndex {
                kind: "line number program",
                index: lnp_idx,
                entity: self.header.lnp_idx_off,
            });
        }
        let mut r = Reader::at(self.data, self.header.lnp_idx_off as usize + lnp_idx as usize * 4)?;
        Ok(r.get_u32()? as usize)
    }
}

impl AbcFile for PandaFile<'_> {
    fn file_size(&self) -> u32 {
        self.header.file_size
    }

    fn classes(&self) -> Result<Vec<EntityId>> {
        self.offset_table(self.header.class_idx_off, self.header.num_classes)
    }

    fn literal_arrays(&self) -> Result<Vec<EntityId>> {
        self.offset_table(self.header.literalarray_idx_off, self.header.num_literalarrays)
    }

    fn string_data(&self, id: EntityId) -> Result<String> {
        let mut r = self.reader_at(id)?;
        r.get_uleb128()?;
        r.get_mutf8()
    }

    fn is_external(&self, id: EntityId) -> bool {
        let off = id.offset();
        let start = self.header.foreign_off;
        off >= start && off < start.saturating_add(self.header.foreign_size)
    }

    fn class(&self, id: EntityId) -> Result<ClassData> {
        let mut r = self.reader_at(id)?;
        Self::skip_string(&mut r)?;
        let _super_class = r.get_u32()?;
        let access_flags = r.get_uleb128()?;
        let num_fields = r.get_uleb128()?;
        let num_methods = r.get_uleb128()?;

        let mut data = ClassData {
            access_flags,
            ..ClassData::default()
        };
        loop {
            let tag = r.get_u8()?;
            match tag {
                class_tag::NOTHING => break,
                class_tag::INTERFACES => {
                    let n = r.get_uleb128()?;
                    r.skip(n as usize * 2)?;
                }
                class_tag::SOURCE_LANG => data.source_lang = SourceLanguage::from_u8(r.get_u8()?),
                class_tag::RUNTIME_ANNOTATION | class_tag::ANNOTATION => {
                    data.annotations.push(EntityId(r.get_u32()?));
                }
                class_tag::RUNTIME_TYPE_ANNOTATION | class_tag::TYPE_ANNOTATION => r.skip(4)?,
                class_tag::SOURCE_FILE => data.source_file = Some(EntityId(r.get_u32()?)),
                other => {
                    return Err(Abc2AsmError::UnsupportedItemTag {
                        item: "class",
                        tag: other,
                        offset: id.offset(),
                    });
                }
            }
        }

        for _ in 0..num_fields {
            data.fields.push(EntityId(r.pos() as u32));
            self.skip_field(&mut r)?;
        }
        for _ in 0..num_methods {
            data.methods.push(EntityId(r.pos() as u32));
            self.skip_method(&mut r)?;
        }
        Ok(data)
    }

    fn method(&self, id: EntityId) -> Result<MethodData> {
        let mut r = self.reader_at(id)?;
        let class_idx = r.get_u16()?;
        let proto_idx = r.get_u16()?;
        let name_off = r.get_u32()?;
        let access_flags = r.get_uleb128()?;

        let class_id = self.resolve_class_index(id, class_idx)?;
        let proto = match self.region_for(id) {
            Some(region) if region.proto_idx_size > 0 => {
                let proto_id = self.resolve_proto_index(id, proto_idx)?;
                Some(self.read_proto(id, proto_id)?)
            }
            _ => None,
        };

        let mut data = MethodData {
            class_id,
            name_id: EntityId(name_off),
            access_flags,
            proto,
            code_id: None,
            source_lang: None,
            debug_info_id: None,
            annotations: Vec::new(),
        };
        loop {
            let tag = r.get_u8()?;
            match tag {
                method_tag::NOTHING => break,
                method_tag::CODE => data.code_id = Some(EntityId(r.get_u32()?)),
                method_tag::SOURCE_LANG => data.source_lang = SourceLanguage::from_u8(r.get_u8()?),
                method_tag::DEBUG_INFO => data.debug_info_id = Some(EntityId(r.get_u32()?)),
                method_tag::RUNTIME_ANNOTATION | method_tag::ANNOTATION => {
                    data.annotations.push(EntityId(r.get_u32()?));
                }
                method_tag::RUNTIME_PARAM_ANNOTATION
                | method_tag::PARAM_ANNOTATION
                | method_tag::TYPE_ANNOTATION
                | method_tag::RUNTIME_TYPE_ANNOTATION => r.skip(4)?,
                other => {
                    return Err(Abc2AsmError::UnsupportedItemTag {
                        item: "method",
                        tag: other,
                        offset: id.offset(),
                    });
                }
            }
        }
        Ok(data)
    }

    fn field(&self, id: EntityId) -> Result<FieldData> {
        let mut r = self.reader_at(id)?;
        let class_idx = r.get_u16()?;
        let type_idx = r.get_u16()?;
        let name_off = r.get_u32()?;
        let access_flags = r.get_uleb128()?;

        let class_id = self.resolve_class_index(id, class_idx)?;
        let type_ref = self.resolve_class_index(id, type_idx)?;
        let ty = if type_ref.offset() <= MAX_PRIMITIVE_TYPE_CODE {
            FieldType::Primitive(type_ref.offset() as u8)
        } else {
            FieldType::Reference(type_ref)
        };

        let mut value = None;
        loop {
            let tag = r.get_u8()?;
            match tag {
                field_tag::NOTHING => break,
                field_tag::INT_VALUE => value = Some(RawFieldValue::Int(r.get_sleb128()?)),
                field_tag::VALUE => value = Some(RawFieldValue::Word(r.get_u32()?)),
                field_tag::RUNTIME_ANNOTATIONS
                | field_tag::ANNOTATIONS
                | field_tag::RUNTIME_TYPE_ANNOTATION
                | field_tag::TYPE_ANNOTATION => r.skip(4)?,
                other => {
                    return Err(Abc2AsmError::UnsupportedItemTag {
                        item: "field",
                        tag: other,
                        offset: id.offset(),
                    });
                }
            }
        }

        Ok(FieldData {
            class_id,
            name_id: EntityId(name_off),
            ty,
            access_flags,
            value,
        })
    }

    fn code(&self, id: EntityId) -> Result<CodeData<'_>> {
        let mut r = self.reader_at(id)?;
        let num_vregs = r.get_uleb128()?;
        let num_args = r.get_uleb128()?;
        let code_size = r.get_uleb128()?;
        let tries_size = r.get_uleb128()?;
        let instructions = r.get_bytes(code_size as usize)?;

        // each try and catch entry holds at least three uleb128 values
        let mut tries = Vec::with_capacity(r.capacity_for(tries_size, 3));
        for _ in 0..tries_size {
            let start_pc = r.get_uleb128()?;
            let length = r.get_uleb128()?;
            let num_catches = r.get_uleb128()?;
            let mut catches = Vec::with_capacity(r.capacity_for(num_catches, 3));
            for _ in 0..num_catches {
                let type_idx = r.get_uleb128()?;
                let handler_pc = r.get_uleb128()?;
                let code_size = r.get_uleb128()?;
                catches.push(CatchData {
                    type_idx: type_idx.checked_sub(1).map(|v| v as u16),
                    handler_pc,
                    code_size,
                });
            }
            tries.push(TryData {
                start_pc,
                length,
                catches,
            });
        }

        Ok(CodeData {
            num_vregs,
            num_args,
            instructions,
            tries,
        })
    }

    fn literal_array(&self, id: EntityId) -> Result<Vec<RawLiteral>> {
        let mut r = self.reader_at(id)?;
        let count = r.get_u32()?;
        let mut out = Vec::with_capacity(r.capacity_for(count / 2, 2));
        let mut i = 0;
        while i < count {
            let raw_tag = r.get_u8()?;
            let tag =
                LiteralTag::from_u8(raw_tag).ok_or(Abc2AsmError::UnsupportedLiteralTag(raw_tag))?;
            let value = match tag.value_width() {
                1 => RawLiteralValue::U8(r.get_u8()?),
                2 => RawLiteralValue::U16(r.get_u16()?),
                8 => RawLiteralValue::U64(r.get_u64()?),
                _ => RawLiteralValue::U32(r.get_u32()?),
            };
            out.push(RawLiteral { tag, value });
            i += 2;
        }
        Ok(out)
    }

    fn data_at(&self, id: EntityId) -> Result<&[u8]> {
        let off = id.offset() as usize;
        if off >= self.data.len() {
            return Err(Abc2AsmError::OffsetOutOfBounds {
                offset: id.offset(),
                size: self.data.len() as u32,
            });
        }
        Ok(&self.data[off..])
    }

    fn f64_at(&self, id: EntityId) -> Result<f64> {
        let bytes = self.data_at(id)?;
        if bytes.len() < 8 {
            return Err(Abc2AsmError::Eof { offset: id.offset() as usize });
        }
        Ok(LittleEndian::read_f64(&bytes[..8]))
    }

    fn module_record(&self, id: EntityId) -> Result<ModuleRecord> {
        let mut r = self.reader_at(id)?;
        let mut record = ModuleRecord::default();

        let num_requests = r.get_u32()?;
        for _ in 0..num_requests {
            record.requests.push(EntityId(r.get_u32()?));
        }

        let n = r.get_u32()?;
        for _ in 0..n {
            record.entries.push(ModuleEntry::RegularImport {
                local_name: EntityId(r.get_u32()?),
                import_name: EntityId(r.get_u32()?),
                module_idx: r.get_u16()?,
            });
        }
        let n = r.get_u32()?;
        for _ in 0..n {
            record.entries.push(ModuleEntry::NamespaceImport {
                local_name: EntityId(r.get_u32()?),
                module_idx: r.get_u16()?,
            });
        }
        let n = r.get_u32()?;
        for _ in 0..n {
            record.entries.push(ModuleEntry::LocalExport {
                local_name: EntityId(r.get_u32()?),
                export_name: EntityId(r.get_u32()?),
            });
        }
        let n = r.get_u32()?;
        for _ in 0..n {
            record.entries.push(ModuleEntry::IndirectExport {
                export_name: EntityId(r.get_u32()?),
                import_name: EntityId(r.get_u32()?),
                module_idx: r.get_u16()?,
            });
        }
        let n = r.get_u32()?;
        for _ in 0..n {
            record.entries.push(ModuleEntry::StarExport {
                module_idx: r.get_u16()?,
            });
        }
        Ok(record)
    }

    fn annotation(&self, id: EntityId) -> Result<AnnotationData> {
        let mut r = self.reader_at(id)?;
        let class_id = EntityId(r.get_u32()?);
        let count = r.get_u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_id = EntityId(r.get_u32()?);
            let value = r.get_u32()?;
            elements.push(AnnotationElementData { name_id, tag: 0, value });
        }
        let mut tags = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match r.get_u8() {
                Ok(t) => tags.push(t),
                Err(_) => break,
            }
        }
        for (el, tag) in elements.iter_mut().zip(&tags) {
            el.tag = *tag;
        }
        Ok(AnnotationData {
            class_id,
            elements,
            tags,
        })
    }

    fn resolve_index(&self, method_id: EntityId, idx: u16) -> Result<EntityId> {
        let region = self
            .region_for(method_id)
            .ok_or_else(|| self.no_region("method", idx, method_id))?;
        self.index_entry(region.method_idx_off, region.method_idx_size, idx, "method", method_id)
    }

    fn resolve_class_index(&self, entity_id: EntityId, idx: u16) -> Result<EntityId> {
        let region = self
            .region_for(entity_id)
            .ok_or_else(|| self.no_region("class", idx, entity_id))?;
        self.index_entry(region.class_idx_off, region.class_idx_size, idx, "class", entity_id)
    }

    fn resolve_field_index(&self, method_id: EntityId, idx: u16) -> Result<EntityId> {
        let region = self
            .region_for(method_id)
            .ok_or_else(|| self.no_region("field", idx, method_id))?;
        self.index_entry(region.field_idx_off, region.field_idx_size, idx, "field", method_id)
    }

    fn debug_info(&self, method_id: EntityId) -> Result<Option<DebugInfo>> {
        let method = self.method(method_id)?;
        let Some(debug_id) = method.debug_info_id else {
            return Ok(None);
        };
        let code_size = match method.code_id {
            Some(code_id) => self.code(code_id)?.instructions.len() as u32,
            None => 0,
        };

        let mut r = self.reader_at(debug_id)?;
        let line_start = r.get_uleb128()?;
        let num_params = r.get_uleb128()?;
        let mut param_ids = Vec::with_capacity(r.capacity_for(num_params, 1));
        for _ in 0..num_params {
            param_ids.push(r.get_uleb128()?);
        }
        let cp_size = r.get_uleb128()?;
        let constant_pool = r.get_bytes(cp_size as usize)?;
        let lnp_idx = r.get_uleb128()?;
        let program_off = self.lnp_offset(lnp_idx)?;
        let program = Reader::at(self.data, program_off)?;

        let string_at = |off: u32| -> Result<Option<String>> {
            if off == 0 {
                Ok(None)
            } else {
                self.string_data(EntityId(off)).map(Some)
            }
        };

        let pool = Reader::new(constant_pool);
        let mut info = read_debug_info(line_start, program, pool, code_size, &string_at)?;
        for off in param_ids {
            info.parameter_names.push(string_at(off)?);
        }
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_input() {
        assert!(matches!(PandaFile::parse(b"PANDA"), Err(Abc2AsmError::Eof { .. })));
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; HEADER_SIZE];
        assert!(matches!(PandaFile::parse(&data), Err(Abc2AsmError::BadMagic)));
    }

    #[test]
    fn empty_file_has_no_classes() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..8].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut data[16..20], HEADER_SIZE as u32);
        let file = PandaFile::parse(&data).unwrap();
        assert_eq!(file.file_size(), HEADER_SIZE as u32);
        assert!(file.classes().unwrap().is_empty());
        assert!(file.literal_arrays().unwrap().is_empty());
    }

    #[test]
    fn out_of_bounds_entity_is_reported() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..8].copy_from_slice(MAGIC);
        let file = PandaFile::parse(&data).unwrap();
        let err = file.string_data(EntityId(0x1000)).unwrap_err();
        assert!(matches!(err, Abc2AsmError::OffsetOutOfBounds { offset: 0x1000, .. }));
    }
}
