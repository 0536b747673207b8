//! Raw instruction to symbolic instruction.

use crate::convert::Converter;
use crate::error::Result;
use crate::file::{AbcFile, EntityId, SourceLanguage};
use crate::isa::{IdKind, RawInstruction, RawOperand};
use crate::program::{Instruction, Operand};

impl<F: AbcFile> Converter<'_, F> {
    /// Translates one instruction of method `method_id`. Literal arrays it
    /// references are registered under `owner`.
    pub(crate) fn translate(
        &mut self,
        raw: &RawInstruction,
        method_id: EntityId,
        owner: &str,
    ) -> Result<Instruction> {
        let mut operands = Vec::with_capacity(raw.operands.len());
        for op in &raw.operands {
            operands.push(match *op {
                RawOperand::Reg(r) => Operand::Reg(r),
                RawOperand::Imm(v) => Operand::Imm(v),
                RawOperand::FImm(v) => Operand::FImm(v),
                RawOperand::Id(kind, idx) => self.resolve_id_operand(kind, idx, method_id, owner)?,
            });
        }
        Ok(Instruction::new(raw.info.mnemonic, operands))
    }

    fn resolve_id_operand(
        &mut self,
        kind: IdKind,
        idx: u16,
        method_id: EntityId,
        owner: &str,
    ) -> Result<Operand> {
        let file = self.file;
        let operand = match kind {
            IdKind::String => {
                let id = file.resolve_index(method_id, idx)?;
                Operand::Str(self.names.string_of(file, id)?)
            }
            IdKind::Method => {
                let id = file.resolve_index(method_id, idx)?;
                let name = self.names.function_name(file, id)?;
                self.enqueue_method(id);
                Operand::Name(name)
            }
            IdKind::LiteralArray => {
                let id = file.resolve_index(method_id, idx)?;
                Operand::Name(self.register_literal_array(id, owner))
            }
            IdKind::Field => {
                let id = file.resolve_field_index(method_id, idx)?;
                self.field_operand(id)?
            }
        };
        Ok(operand)
    }

    /// `record.field` reference; foreign fields are buffered for their record.
    fn field_operand(&mut self, field_id: EntityId) -> Result<Operand> {
        let file = self.file;
        let data = file.field(field_id)?;
        let record = self.names.record_name(file, data.class_id)?;
        let name = file.string_data(data.name_id)?;
        if file.is_external(field_id) {
            let already = self
                .external_fields
                .get(&record)
                .is_some_and(|fields| fields.iter().any(|f| f.name == name));
            if !already {
                let language = self.language.unwrap_or(SourceLanguage::PandaAssembly);
                let field = self.convert_field(field_id, &record, language)?;
                self.external_fields.entry(record.clone()).or_default().push(field);
            }
        }
        Ok(Operand::Name(format!("{record}.{name}")))
    }
}
