use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Abc2AsmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeId {
    Invalid,
    Void,
    U1,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    I64,
    U64,
    Reference,
    Tagged,
}

impl TypeId {
    pub fn from_code(code: u8) -> Option<Self> {
        use TypeId::*;
        Some(match code {
            0x00 => Invalid,
            0x01 => Void,
            0x02 => U1,
            0x03 => I8,
            0x04 => U8,
            0x05 => I16,
            0x06 => U16,
            0x07 => I32,
            0x08 => U32,
            0x09 => F32,
            0x0a => F64,
            0x0b => I64,
            0x0c => U64,
            0x0d => Reference,
            0x0e => Tagged,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use TypeId::*;
        match self {
            Invalid => "invalid",
            Void => "void",
            U1 => "u1",
            I8 => "i8",
            U8 => "u8",
            I16 => "i16",
            U16 => "u16",
            I32 => "i32",
            U32 => "u32",
            F32 => "f32",
            F64 => "f64",
            I64 => "i64",
            U64 => "u64",
            Reference => "reference",
            Tagged => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    /// Component name without array brackets.
    pub name: String,
    pub rank: usize,
    pub id: TypeId,
}

pub const STRING_RECORD: &str = "panda.String";

impl Type {
    pub fn primitive(id: TypeId) -> Self {
        Self {
            name: id.name().to_string(),
            rank: 0,
            id,
        }
    }

    pub fn any() -> Self {
        Self::primitive(TypeId::Tagged)
    }

    pub fn record(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: 0,
            id: TypeId::Reference,
        }
    }

    pub fn pandasm_name(&self) -> String {
        let mut s = self.name.clone();
        for _ in 0..self.rank {
            s.push_str("[]");
        }
        s
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0
    }

    pub fn is_string(&self) -> bool {
        self.rank == 0 && self.id == TypeId::Reference && self.name == STRING_RECORD
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pandasm_name())
    }
}

pub fn primitive_type(code: u8) -> Result<Type> {
    let id = TypeId::from_code(code)
        .ok_or_else(|| Abc2AsmError::InvalidDescriptor(format!("type code 0x{code:02x}")))?;
    Ok(Type::primitive(id))
}

/// Converts a `/`-separated class name to dotted form. Names that are
/// normalized source paths (leading `&`) keep their separators.
pub fn dotted_name(name: &str) -> String {
    if name.starts_with('&') {
        name.to_string()
    } else {
        name.replace('/', ".")
    }
}

/// Parses a type descriptor such as `[[Lfoo/Bar;` or `I`.
pub fn reference_type(descriptor: &str) -> Result<Type> {
    let bad = || Abc2AsmError::InvalidDescriptor(descriptor.to_string());
    let rank = descriptor.bytes().take_while(|&b| b == b'[').count();
    let component = &descriptor[rank..];

    let mut chars = component.chars();
    let first = chars.next().ok_or_else(bad)?;
    let ty = if first == 'L' {
        let body = component[1..].strip_suffix(';').ok_or_else(bad)?;
        if body.is_empty() {
            return Err(bad());
        }
        Type {
            name: dotted_name(body),
            rank,
            id: TypeId::Reference,
        }
    } else {
        if chars.next().is_some() {
            return Err(bad());
        }
        let id = match first {
            'V' => TypeId::Void,
            'Z' => TypeId::U1,
            'B' => TypeId::I8,
            'H' => TypeId::U8,
            'S' => TypeId::I16,
            'C' => TypeId::U16,
            'I' => TypeId::I32,
            'U' => TypeId::U32,
            'J' => TypeId::I64,
            'Q' => TypeId::U64,
            'F' => TypeId::F32,
            'D' => TypeId::F64,
            'A' => TypeId::Tagged,
            _ => return Err(bad()),
        };
        Type {
            name: id.name().to_string(),
            rank,
            id,
        }
    };
    Ok(ty)
}

/// Interpretation of a field's stored value, chosen from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValueKind {
    U1,
    U8,
    U32,
    F64,
    String,
    LiteralArray,
}

pub fn field_scalar_type(field: &str, ty: &Type) -> Result<FieldValueKind> {
    if ty.is_array() {
        return Ok(FieldValueKind::LiteralArray);
    }
    match ty.id {
        TypeId::U1 => Ok(FieldValueKind::U1),
        TypeId::U8 => Ok(FieldValueKind::U8),
        TypeId::U32 => Ok(FieldValueKind::U32),
        TypeId::F64 => Ok(FieldValueKind::F64),
        TypeId::Reference if ty.is_string() => Ok(FieldValueKind::String),
        _ => Err(Abc2AsmError::UnsupportedFieldType {
            field: field.to_string(),
            ty: ty.pandasm_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_descriptors() {
        let t = reference_type("Lfoo/bar/Baz;").unwrap();
        assert_eq!(t.name, "foo.bar.Baz");
        assert_eq!(t.rank, 0);
        assert_eq!(t.id, TypeId::Reference);

        let t = reference_type("[[Lpanda/String;").unwrap();
        assert_eq!(t.pandasm_name(), "panda.String[][]");
    }

    #[test]
    fn source_path_records_keep_slashes() {
        let t = reference_type("L&entry/src/main/ets/Index&;").unwrap();
        assert_eq!(t.name, "&entry/src/main/ets/Index&");
    }

    #[test]
    fn parses_primitive_descriptors() {
        assert_eq!(reference_type("I").unwrap().pandasm_name(), "i32");
        assert_eq!(reference_type("[D").unwrap().pandasm_name(), "f64[]");
        assert_eq!(reference_type("A").unwrap().pandasm_name(), "any");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for d in ["", "L;", "Lfoo", "X", "II", "["] {
            assert!(
                matches!(reference_type(d), Err(Abc2AsmError::InvalidDescriptor(_))),
                "{d:?} should be rejected"
            );
        }
    }

    #[test]
    fn primitive_codes_map_through_table() {
        assert_eq!(primitive_type(0x0e).unwrap(), Type::any());
        assert_eq!(primitive_type(0x07).unwrap().name, "i32");
        assert!(primitive_type(0x0f).is_err());
    }

    #[test]
    fn field_value_kind_follows_declared_type() {
        let u32_kind = field_scalar_type("a", &Type::primitive(TypeId::U32)).unwrap();
        assert_eq!(u32_kind, FieldValueKind::U32);
        let string_kind = field_scalar_type("s", &Type::record(STRING_RECORD)).unwrap();
        assert_eq!(string_kind, FieldValueKind::String);
        assert_eq!(
            field_scalar_type("arr", &reference_type("[I").unwrap()).unwrap(),
            FieldValueKind::LiteralArray
        );
        assert!(matches!(
            field_scalar_type("x", &Type::primitive(TypeId::I64)),
            Err(Abc2AsmError::UnsupportedFieldType { .. })
        ));
    }
}
