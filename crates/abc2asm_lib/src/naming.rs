use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::file::{AbcFile, EntityId};
use crate::types::reference_type;

pub const GLOBAL_RECORD: &str = "_GLOBAL";

/// Escapes characters that would break the assembly grammar.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '#' => out.push_str("\\#"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c => out.push(c),
        }
    }
    out
}

/// Array types and the implicit global record carry no name prefix on
/// their methods.
pub fn is_system_type(record: &str) -> bool {
    record.contains('[') || record == GLOBAL_RECORD
}

/// Memoized id to name resolution shared by every part of a conversion.
#[derive(Debug, Default)]
pub struct NameCache {
    bundle_name: Option<String>,
    records: HashMap<EntityId, String>,
    functions: HashMap<EntityId, String>,
    literal_arrays: HashMap<EntityId, String>,
    strings: BTreeMap<u32, String>,
}

impl NameCache {
    pub fn new(bundle_name: Option<String>) -> Self {
        Self {
            bundle_name: bundle_name.filter(|b| !b.is_empty()),
            ..Self::default()
        }
    }

    /// Escaped string at `id`, recorded in the program string set.
    pub fn string_of<F: AbcFile>(&mut self, file: &F, id: EntityId) -> Result<String> {
        if let Some(s) = self.strings.get(&id.offset()) {
            return Ok(s.clone());
        }
        let s = escape(&file.string_data(id)?);
        self.strings.insert(id.offset(), s.clone());
        Ok(s)
    }

    pub fn record_name<F: AbcFile>(&mut self, file: &F, class_id: EntityId) -> Result<String> {
        if let Some(name) = self.records.get(&class_id) {
            return Ok(name.clone());
        }
        let descriptor = file.string_data(class_id)?;
        let mut name = reference_type(&descriptor)?.pandasm_name();
        if let Some(bundle) = &self.bundle_name {
            if name.starts_with('&') {
                name = format!("{bundle}{name}");
            }
        }
        self.records.insert(class_id, name.clone());
        Ok(name)
    }

    pub fn function_name<F: AbcFile>(&mut self, file: &F, method_id: EntityId) -> Result<String> {
        if let Some(name) = self.functions.get(&method_id) {
            return Ok(name.clone());
        }
        let method = file.method(method_id)?;
        let record = self.record_name(file, method.class_id)?;
        let raw = match file.string_data(method.name_id)?.as_str() {
            ".ctor" => "_ctor_".to_string(),
            ".cctor" => "_cctor_".to_string(),
            other => other.to_string(),
        };
        let name = if is_system_type(&record) {
            raw
        } else {
            format!("{record}.{raw}")
        };
        self.functions.insert(method_id, name.clone());
        Ok(name)
    }

    /// Synthetic name of a literal array, fixed by its first owner.
    pub fn literal_array_name(&mut self, id: EntityId, owner: &str) -> String {
        self.literal_arrays
            .entry(id)
            .or_insert_with(|| {
                if owner.is_empty() {
                    format!("_{}", id.offset())
                } else {
                    format!("{owner}_{}", id.offset())
                }
            })
            .clone()
    }

    pub fn into_strings(self) -> BTreeMap<u32, String> {
        self.strings
    }
}
