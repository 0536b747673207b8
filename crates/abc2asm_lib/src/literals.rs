use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::convert::Converter;
use crate::error::{Abc2AsmError, Result};
use crate::file::{AbcFile, EntityId, LiteralTag, RawLiteral, RawLiteralValue};
use crate::module::flatten;
use crate::program::{Literal, LiteralArray, LiteralValue};
use crate::reader::Reader;

/// Tracks which literal arrays still need decoding so that each one is
/// decoded exactly once, even for cyclic references.
#[derive(Debug, Default)]
pub struct LiteralWorklist {
    known: HashSet<EntityId>,
    done: HashSet<EntityId>,
    pending: HashSet<EntityId>,
    scheduled: VecDeque<EntityId>,
    pending_order: VecDeque<EntityId>,
    owners: HashMap<EntityId, String>,
}

impl LiteralWorklist {
    /// Schedules a top-level array.
    pub fn register(&mut self, id: EntityId, owner: &str) {
        self.owners.entry(id).or_insert_with(|| owner.to_string());
        if self.known.insert(id) && !self.done.contains(&id) {
            self.scheduled.push_back(id);
        }
    }

    /// Notes an array referenced from inside another array.
    pub fn discover(&mut self, id: EntityId, owner: &str) {
        self.owners.entry(id).or_insert_with(|| owner.to_string());
        if self.known.contains(&id) || self.done.contains(&id) {
            return;
        }
        if self.pending.insert(id) {
            self.pending_order.push_back(id);
        }
    }

    /// Next array to decode; top-level arrays first. The returned id is
    /// marked done.
    pub fn next(&mut self) -> Option<EntityId> {
        loop {
            let id = match self.scheduled.pop_front() {
                Some(id) => id,
                None => {
                    let id = self.pending_order.pop_front()?;
                    self.pending.remove(&id);
                    id
                }
            };
            if self.done.insert(id) {
                return Some(id);
            }
        }
    }

    pub fn owner(&self, id: EntityId) -> &str {
        self.owners.get(&id).map(String::as_str).unwrap_or("")
    }
}

fn mismatch(tag: LiteralTag) -> Abc2AsmError {
    Abc2AsmError::LiteralValueMismatch(tag.name())
}

fn value_u8(tag: LiteralTag, v: RawLiteralValue) -> Result<u8> {
    match v {
        RawLiteralValue::U8(b) => Ok(b),
        _ => Err(mismatch(tag)),
    }
}

fn value_u16(tag: LiteralTag, v: RawLiteralValue) -> Result<u16> {
    match v {
        RawLiteralValue::U16(h) => Ok(h),
        _ => Err(mismatch(tag)),
    }
}

fn value_u32(tag: LiteralTag, v: RawLiteralValue) -> Result<u32> {
    match v {
        RawLiteralValue::U32(w) => Ok(w),
        _ => Err(mismatch(tag)),
    }
}

fn value_u64(tag: LiteralTag, v: RawLiteralValue) -> Result<u64> {
    match v {
        RawLiteralValue::U64(d) => Ok(d),
        _ => Err(mismatch(tag)),
    }
}

impl<F: AbcFile> Converter<'_, F> {
    /// Registers a top-level literal array and returns its synthetic name.
    pub(crate) fn register_literal_array(&mut self, id: EntityId, owner: &str) -> String {
        let name = self.names.literal_array_name(id, owner);
        self.literals.register(id, owner);
        name
    }

    /// Decodes every registered and discovered array. Method bodies found
    /// along the way are reconstructed before the next array is taken.
    pub(crate) fn drain_literal_arrays(&mut self) -> Result<()> {
        while let Some(id) = self.literals.next() {
            if self.phase_ids.contains(&id) {
                continue;
            }
            let owner = self.literals.owner(id).to_string();
            let name = self.names.literal_array_name(id, &owner);
            let array = if self.module_ids.contains(&id) {
                debug!(%id, name, "flattening module record");
                let file = self.file;
                let record = file.module_record(id)?;
                let names = &mut self.names;
                flatten(&record, |sid| names.string_of(file, sid))?
            } else {
                debug!(%id, name, "decoding literal array");
                self.decode_literal_array(id, &owner)?
            };
            self.program.insert_literal_array(name, array)?;
            self.drain_methods()?;
        }
        Ok(())
    }

    pub(crate) fn decode_literal_array(
        &mut self,
        id: EntityId,
        owner: &str,
    ) -> Result<LiteralArray> {
        let raw = self.file.literal_array(id)?;
        let mut literals = Vec::with_capacity(raw.len());
        for lit in &raw {
            self.convert_literal(lit, owner, &mut literals)?;
        }
        Ok(LiteralArray { literals })
    }

    fn convert_literal(
        &mut self,
        lit: &RawLiteral,
        owner: &str,
        out: &mut Vec<Literal>,
    ) -> Result<()> {
        let tag = lit.tag;
        if tag.is_array() {
            let blob = EntityId(value_u32(tag, lit.value)?);
            return self.expand_array_blob(tag, blob, out);
        }
        let value = match tag {
            // tag markers carry no value of their own
            LiteralTag::TagValue => return Ok(()),
            LiteralTag::Accessor | LiteralTag::NullValue | LiteralTag::BuiltinTypeIndex => {
                LiteralValue::U8(value_u8(tag, lit.value)?)
            }
            LiteralTag::Bool => LiteralValue::Bool(value_u8(tag, lit.value)? != 0),
            LiteralTag::MethodAffiliate => LiteralValue::U16(value_u16(tag, lit.value)?),
            LiteralTag::Integer => LiteralValue::I32(value_u32(tag, lit.value)? as i32),
            LiteralTag::LiteralBufferIndex => LiteralValue::U32(value_u32(tag, lit.value)?),
            LiteralTag::Float => LiteralValue::F32(f32::from_bits(value_u32(tag, lit.value)?)),
            LiteralTag::Double => LiteralValue::F64(f64::from_bits(value_u64(tag, lit.value)?)),
            LiteralTag::BigInt => LiteralValue::I64(value_u64(tag, lit.value)? as i64),
            LiteralTag::String => {
                let sid = EntityId(value_u32(tag, lit.value)?);
                LiteralValue::Str(self.names.string_of(self.file, sid)?)
            }
            LiteralTag::Method
            | LiteralTag::GeneratorMethod
            | LiteralTag::AsyncGeneratorMethod
            | LiteralTag::Getter
            | LiteralTag::Setter => {
                let mid = EntityId(value_u32(tag, lit.value)?);
                let name = self.names.function_name(self.file, mid)?;
                self.enqueue_method(mid);
                LiteralValue::Name(name)
            }
            LiteralTag::LiteralArray => {
                let nested = EntityId(value_u32(tag, lit.value)?);
                let name = self.names.literal_array_name(nested, owner);
                self.literals.discover(nested, owner);
                LiteralValue::Name(name)
            }
            _ => return Err(mismatch(tag)),
        };
        out.push(Literal::new(tag, value));
        Ok(())
    }

    /// Expands a `u32` count prefixed blob of fixed-width elements.
    fn expand_array_blob(
        &mut self,
        tag: LiteralTag,
        blob: EntityId,
        out: &mut Vec<Literal>,
    ) -> Result<()> {
        let file = self.file;
        let mut r = Reader::new(file.data_at(blob)?);
        let count = r.get_u32()?;
        for _ in 0..count {
            let value = match tag {
                LiteralTag::ArrayU1 => LiteralValue::Bool(r.get_u8()? != 0),
                LiteralTag::ArrayU8 => LiteralValue::U8(r.get_u8()?),
                LiteralTag::ArrayI8 => LiteralValue::I8(r.get_i8()?),
                LiteralTag::ArrayU16 => LiteralValue::U16(r.get_u16()?),
                LiteralTag::ArrayI16 => LiteralValue::I16(r.get_i16()?),
                LiteralTag::ArrayU32 => LiteralValue::U32(r.get_u32()?),
                LiteralTag::ArrayI32 => LiteralValue::I32(r.get_i32()?),
                LiteralTag::ArrayU64 => LiteralValue::U64(r.get_u64()?),
                LiteralTag::ArrayI64 => LiteralValue::I64(r.get_u64()? as i64),
                LiteralTag::ArrayF32 => LiteralValue::F32(r.get_f32()?),
                LiteralTag::ArrayF64 => LiteralValue::F64(r.get_f64()?),
                LiteralTag::ArrayString => {
                    let sid = EntityId(r.get_u32()?);
                    LiteralValue::Str(self.names.string_of(file, sid)?)
                }
                _ => return Err(mismatch(tag)),
            };
            out.push(Literal::new(tag, value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_arrays_are_decoded_once() {
        let mut wl = LiteralWorklist::default();
        wl.register(EntityId(1), "A");
        assert_eq!(wl.next(), Some(EntityId(1)));

        // 1 references 2 twice and itself
        wl.discover(EntityId(2), "A");
        wl.discover(EntityId(2), "A");
        wl.discover(EntityId(1), "A");
        assert_eq!(wl.next(), Some(EntityId(2)));
        wl.discover(EntityId(1), "A");
        wl.discover(EntityId(2), "A");
        assert_eq!(wl.next(), None);
    }

    #[test]
    fn known_arrays_are_not_pending() {
        let mut wl = LiteralWorklist::default();
        wl.register(EntityId(5), "R");
        wl.discover(EntityId(5), "Other");
        assert_eq!(wl.owner(EntityId(5)), "R");
        assert_eq!(wl.next(), Some(EntityId(5)));
        assert_eq!(wl.next(), None);
    }

    #[test]
    fn pending_array_registered_later_is_decoded_once() {
        let mut wl = LiteralWorklist::default();
        wl.discover(EntityId(9), "");
        wl.register(EntityId(9), "R");
        assert_eq!(wl.next(), Some(EntityId(9)));
        assert_eq!(wl.next(), None);
        wl.register(EntityId(9), "R");
        wl.discover(EntityId(9), "R");
        assert_eq!(wl.next(), None);
    }
}
