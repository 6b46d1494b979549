//! Codegen-local type helpers: a thin wrapper over `Type::generate_ir_type`
//! plus the field-offset/struct-literal concerns codegen needs that don't
//! belong on the type model itself (it only knows field *names*, not IR
//! GEP index syntax).

use crate::types::Type;

/// `ptr`-to-field GEP suffix for a record field access.
pub fn field_gep(record_ty: &Type, field: &str) -> Option<(usize, Type)> {
    let idx = record_ty.field_index(field)?;
    let ty = record_ty.field_type(field)?.clone();
    Some((idx, ty))
}

pub fn ir_type(ty: &Type) -> String {
    ty.generate_ir_type()
}
