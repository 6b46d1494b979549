//! Type registry & type model (C4)
//!
//! `Type` is the semantic type lattice every expression resolves to.
//! Layout-generation methods (`generate_ir_type` and the `FieldAccessableType`
//! capability) live here as plain `match`-dispatch inherent methods rather
//! than a trait-object hierarchy — each type knows its own LLVM IR shape,
//! but nothing here is virtual.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Integer { width: u8 },
    Character,
    Single,
    Double,
    Boolean,
    Pointer { base: Option<Box<Type>> },
    String,
    FixedArray { lo: i64, hi: i64, element: Box<Type> },
    DynArray { element: Box<Type> },
    Record { fields: Vec<(String, Type)> },
    Enum { variants: Vec<(String, i64)> },
    ValueRange { lo: i64, hi: i64 },
    File { element: Option<Box<Type>> },
    Unknown,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Integer { .. } | Type::Single | Type::Double | Type::Character
        )
    }

    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            Type::Integer { .. } | Type::Character | Type::Single | Type::Double | Type::Boolean
        )
    }

    /// The canonical name used to key an overload signature, e.g.
    /// `name(integer,string)`.
    pub fn type_name(&self) -> String {
        match self {
            Type::Integer { width: 8 } => "shortint".to_string(),
            Type::Integer { width: 16 } => "smallint".to_string(),
            Type::Integer { width: 32 } => "integer".to_string(),
            Type::Integer { width: 64 } => "int64".to_string(),
            Type::Integer { width } => format!("int{width}"),
            Type::Character => "char".to_string(),
            Type::Single => "single".to_string(),
            Type::Double => "double".to_string(),
            Type::Boolean => "boolean".to_string(),
            Type::Pointer { base: Some(b) } => format!("^{}", b.type_name()),
            Type::Pointer { base: None } => "pointer".to_string(),
            Type::String => "string".to_string(),
            Type::FixedArray { lo, hi, element } => {
                format!("array[{lo}..{hi}] of {}", element.type_name())
            }
            Type::DynArray { element } => format!("array of {}", element.type_name()),
            Type::Record { .. } => "record".to_string(),
            Type::Enum { .. } => "enum".to_string(),
            Type::ValueRange { lo, hi } => format!("{lo}..{hi}"),
            Type::File { .. } => "file".to_string(),
            Type::Unknown => "unknown".to_string(),
        }
    }

    pub fn width(&self) -> u8 {
        match self {
            Type::Integer { width } => *width,
            Type::Character => 8,
            Type::Boolean => 1,
            Type::ValueRange { hi, .. } => {
                if (*hi as f64).log2().ceil() <= 32.0 {
                    32
                } else {
                    64
                }
            }
            _ => 32,
        }
    }

    /// This type's LLVM IR shape, as the codegen stage emits it textually.
    pub fn generate_ir_type(&self) -> String {
        match self {
            Type::Integer { width } => format!("i{width}"),
            Type::Character => "i8".to_string(),
            Type::Boolean => "i1".to_string(),
            Type::Single => "float".to_string(),
            Type::Double => "double".to_string(),
            Type::Pointer { .. } => "ptr".to_string(),
            Type::String => "{ i64, i64, i8* }".to_string(),
            Type::FixedArray { lo, hi, element } => {
                let n = hi - lo + 1;
                format!("[{n} x {}]", element.generate_ir_type())
            }
            Type::DynArray { element } => format!("{{ i64, {}* }}", element.generate_ir_type()),
            Type::Record { fields } => {
                let parts: Vec<String> = fields.iter().map(|(_, t)| t.generate_ir_type()).collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Type::Enum { .. } => "i32".to_string(),
            Type::ValueRange { .. } => format!("i{}", self.width()),
            Type::File { .. } => "{ i8*, i8*, i1 }".to_string(),
            Type::Unknown => "void".to_string(),
        }
    }

    /// Zero-based index of `name` within a record's fields.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        match self {
            Type::Record { fields } => fields.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)),
            _ => None,
        }
    }

    pub fn field_type(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Record { fields } => fields
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, t)| t),
            _ => None,
        }
    }

    // --- FieldAccessableType capability: arrays, strings, ranges ---

    pub fn generate_field_access(&self, index: &str) -> String {
        match self {
            Type::FixedArray { element, .. } => {
                format!("getelementptr inbounds {}, ptr %base, i64 0, i64 {index}", element.generate_ir_type())
            }
            Type::DynArray { element } | Type::File { element: Some(element), .. } => {
                format!("getelementptr inbounds {}, ptr %data, i64 {index}", element.generate_ir_type())
            }
            Type::String => format!("getelementptr inbounds i8, ptr %data, i64 {index}"),
            _ => format!("getelementptr inbounds i8, ptr %base, i64 {index}"),
        }
    }

    pub fn generate_length_value(&self) -> String {
        match self {
            Type::FixedArray { lo, hi, .. } => (hi - lo + 1).to_string(),
            Type::DynArray { .. } => "%length".to_string(),
            Type::String => "%length".to_string(),
            _ => "0".to_string(),
        }
    }

    pub fn generate_low_value(&self) -> String {
        match self {
            Type::FixedArray { lo, .. } => lo.to_string(),
            Type::ValueRange { lo, .. } => lo.to_string(),
            _ => "0".to_string(),
        }
    }

    /// Only meaningful for types whose high bound is a compile-time
    /// constant. `DynArray`/`String` bounds depend on a runtime length
    /// field and are computed in codegen instead (see `emit_range_check`
    /// and the `low`/`high` system calls).
    pub fn generate_high_value(&self) -> String {
        match self {
            Type::FixedArray { hi, .. } => hi.to_string(),
            Type::ValueRange { hi, .. } => hi.to_string(),
            _ => "0".to_string(),
        }
    }

    pub fn generate_lower_bound(&self) -> i64 {
        match self {
            Type::FixedArray { lo, .. } | Type::ValueRange { lo, .. } => *lo,
            _ => 0,
        }
    }

    pub fn generate_upper_bound(&self) -> i64 {
        match self {
            Type::FixedArray { hi, .. } | Type::ValueRange { hi, .. } => *hi,
            _ => 0,
        }
    }
}

/// Maps lower-cased type names to `Type`, seeded with built-ins.
#[derive(Debug, Clone)]
pub struct TypeRegistry(HashMap<String, Type>);

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut reg = TypeRegistry(HashMap::new());
        reg.register("shortint", Type::Integer { width: 8 });
        reg.register("byte", Type::Integer { width: 8 });
        reg.register("smallint", Type::Integer { width: 16 });
        reg.register("word", Type::Integer { width: 16 });
        reg.register("integer", Type::Integer { width: 32 });
        reg.register("longint", Type::Integer { width: 32 });
        reg.register("int64", Type::Integer { width: 64 });
        reg.register("char", Type::Character);
        reg.register("single", Type::Single);
        reg.register("real", Type::Double);
        reg.register("double", Type::Double);
        reg.register("boolean", Type::Boolean);
        reg.register("string", Type::String);
        reg.register("pointer", Type::Pointer { base: None });
        reg.register(
            "pinteger",
            Type::Pointer {
                base: Some(Box::new(Type::Integer { width: 32 })),
            },
        );
        reg
    }

    pub fn register(&mut self, name: &str, ty: Type) {
        self.0.insert(name.to_lowercase(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.0.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_lowercase())
    }

    /// Merge `other`'s entries into `self`, keeping `self`'s entry on a
    /// name collision (importer semantics for `uses` resolution).
    pub fn merge_without_overwrite(&mut self, other: &TypeRegistry) {
        for (name, ty) in other.0.iter() {
            self.0.entry(name.clone()).or_insert_with(|| ty.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_seeds_builtins() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.lookup("integer"), Some(&Type::Integer { width: 32 }));
        assert_eq!(reg.lookup("INTEGER"), Some(&Type::Integer { width: 32 }));
        assert_eq!(reg.lookup("string"), Some(&Type::String));
    }

    #[test]
    fn fixed_array_ir_type_and_length() {
        let ty = Type::FixedArray {
            lo: 1,
            hi: 3,
            element: Box::new(Type::Integer { width: 32 }),
        };
        assert_eq!(ty.generate_ir_type(), "[3 x i32]");
        assert_eq!(ty.generate_length_value(), "3");
    }

    #[test]
    fn record_field_index_is_declaration_order() {
        let ty = Type::Record {
            fields: vec![
                ("x".to_string(), Type::Integer { width: 32 }),
                ("y".to_string(), Type::Integer { width: 32 }),
            ],
        };
        assert_eq!(ty.field_index("y"), Some(1));
        assert_eq!(ty.field_index("Y"), Some(1));
    }

    #[test]
    fn merge_does_not_overwrite_existing_entries() {
        let mut a = TypeRegistry::new();
        a.register("t", Type::Boolean);
        let mut b = TypeRegistry::new();
        b.register("t", Type::String);
        a.merge_without_overwrite(&b);
        assert_eq!(a.lookup("t"), Some(&Type::Boolean));
    }
}
