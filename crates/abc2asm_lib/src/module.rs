//! ES module record flattening.
//!
//! Layout of the produced array:
//!
//! ```text
//! n, request_0 .. request_{n-1},
//! k1, regular imports    (local, import, module)
//! k2, namespace imports  (local, module)
//! k3, local exports      (local, export)
//! k4, indirect exports   (export, import, module)
//! k5, star exports       (module)
//! ```

use crate::error::Result;
use crate::file::{EntityId, LiteralTag, ModuleEntry, ModuleRecord};
use crate::program::{Literal, LiteralArray, LiteralValue};

/// Literals per entry, in kind order.
pub const STRIDES: [usize; 5] = [3, 2, 2, 3, 1];

fn kind_index(entry: &ModuleEntry) -> usize {
    match entry {
        ModuleEntry::RegularImport { .. } => 0,
        ModuleEntry::NamespaceImport { .. } => 1,
        ModuleEntry::LocalExport { .. } => 2,
        ModuleEntry::IndirectExport { .. } => 3,
        ModuleEntry::StarExport { .. } => 4,
    }
}

fn count(n: usize) -> Literal {
    Literal::new(LiteralTag::Integer, LiteralValue::I32(n as i32))
}

fn module_idx(idx: u16) -> Literal {
    Literal::new(LiteralTag::MethodAffiliate, LiteralValue::U16(idx))
}

pub fn flatten(
    record: &ModuleRecord,
    mut string_of: impl FnMut(EntityId) -> Result<String>,
) -> Result<LiteralArray> {
    let mut name = |id: EntityId| -> Result<Literal> {
        Ok(Literal::new(LiteralTag::String, LiteralValue::Str(string_of(id)?)))
    };

    let mut literals =
        Vec::with_capacity(1 + record.requests.len() + 5 + record.entries.len() * 3);
    literals.push(count(record.requests.len()));
    for &req in &record.requests {
        literals.push(name(req)?);
    }
    let header_len = literals.len();

    // entries of one kind must be contiguous; keep their relative order
    let mut entries: Vec<&ModuleEntry> = record.entries.iter().collect();
    entries.sort_by_key(|e| kind_index(e));

    let mut counts = [0usize; 5];
    for entry in entries {
        counts[kind_index(entry)] += 1;
        match *entry {
            ModuleEntry::RegularImport { local_name, import_name, module_idx: idx } => {
                literals.push(name(local_name)?);
                literals.push(name(import_name)?);
                literals.push(module_idx(idx));
            }
            ModuleEntry::NamespaceImport { local_name, module_idx: idx } => {
                literals.push(name(local_name)?);
                literals.push(module_idx(idx));
            }
            ModuleEntry::LocalExport { local_name, export_name } => {
                literals.push(name(local_name)?);
                literals.push(name(export_name)?);
            }
            ModuleEntry::IndirectExport { export_name, import_name, module_idx: idx } => {
                literals.push(name(export_name)?);
                literals.push(name(import_name)?);
                literals.push(module_idx(idx));
            }
            ModuleEntry::StarExport { module_idx: idx } => literals.push(module_idx(idx)),
        }
    }

    let mut at = header_len;
    for (kind, &n) in counts.iter().enumerate() {
        literals.insert(at, count(n));
        at += 1 + n * STRIDES[kind];
    }
    Ok(LiteralArray { literals })
}

/// Positions of the five per-kind count literals.
pub fn count_positions(requests: usize, counts: [usize; 5]) -> [usize; 5] {
    let mut out = [0usize; 5];
    let mut at = 1 + requests;
    for kind in 0..5 {
        out[kind] = at;
        at += 1 + counts[kind] * STRIDES[kind];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(id: u32) -> EntityId {
        EntityId(id)
    }

    fn resolve(id: EntityId) -> Result<String> {
        Ok(format!("s{}", id.0))
    }

    #[test]
    fn counts_are_backpatched_per_kind() {
        let record = ModuleRecord {
            requests: vec![s(1), s(2)],
            entries: vec![
                ModuleEntry::LocalExport { local_name: s(10), export_name: s(11) },
                ModuleEntry::RegularImport { local_name: s(20), import_name: s(21), module_idx: 0 },
                ModuleEntry::StarExport { module_idx: 1 },
                ModuleEntry::RegularImport { local_name: s(22), import_name: s(23), module_idx: 1 },
                ModuleEntry::LocalExport { local_name: s(12), export_name: s(13) },
            ],
        };
        let array = flatten(&record, resolve).unwrap();
        let counts = [2, 0, 2, 0, 1];
        let expected_len = 1 + 2 + 5 + 3 * 2 + 2 * 2 + 1;
        assert_eq!(array.literals.len(), expected_len);

        for (kind, pos) in count_positions(2, counts).into_iter().enumerate() {
            let expected = LiteralValue::I32(counts[kind] as i32);
            assert_eq!(array.literals[pos].value, expected, "kind {kind}");
        }
        assert_eq!(array.literals[1].value, LiteralValue::Str("s1".into()));
        // regular imports keep their encounter order
        assert_eq!(array.literals[4].value, LiteralValue::Str("s20".into()));
        assert_eq!(array.literals[7].value, LiteralValue::Str("s22".into()));
        assert_eq!(array.literals.last().map(|l| l.tag), Some(LiteralTag::MethodAffiliate));
    }

    #[test]
    fn empty_record_has_only_counts() {
        let array = flatten(&ModuleRecord::default(), resolve).unwrap();
        assert_eq!(array.literals.len(), 6);
        assert!(array.literals.iter().all(|l| l.value == LiteralValue::I32(0)));
    }
}
