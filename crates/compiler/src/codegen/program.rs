//! Top-level IR generator entry point (C8).
//!
//! Emits the module preamble (externs, stdio globals, intrinsic bodies),
//! one `define` per user function, and a synthesized `main` lowering the
//! program's top-level block.

use super::error::CodeGenError;
use super::intrinsics::{self, Platform};
use super::state::{CodeGen, NamedAlloc};
use super::statements::lower_statement;
use crate::ast::{Block, FunctionDef, Unit, UnitKind, VariableDef};
use crate::types::{Type, TypeRegistry};

pub fn codegen_unit(unit: &Unit) -> Result<String, CodeGenError> {
    let registry = TypeRegistry::new();
    let mut cg = CodeGen::new(&registry);
    for f in &unit.functions {
        cg.functions.insert(f.name.to_lowercase(), f.clone());
    }

    let platform = Platform::host();
    intrinsics::emit_externs(&mut cg, platform);
    intrinsics::emit_preamble_globals(&mut cg, platform);
    emit_diagnostics_globals(&mut cg, platform);
    intrinsics::emit_intrinsic_bodies(&mut cg);

    for f in &unit.functions {
        if f.body.is_some() {
            lower_function(&mut cg, unit, f)?;
        }
    }

    if unit.kind == UnitKind::Program
        && let Some(main_block) = &unit.main_block {
            lower_main(&mut cg, unit, main_block)?;
        }

    let mut module = String::new();
    module.push_str(&cg.string_globals);
    module.push_str(&cg.output);
    Ok(module)
}

/// `@.fmt.i` and `@.fmt.nl` carry the platform's integer-format and
/// newline bytes: Win32 wants `%lli`/`\r\n`, POSIX wants `%ld`/`\n`.
fn emit_diagnostics_globals(cg: &mut CodeGen, platform: Platform) {
    cg.output.push_str("@.assertmsg = private unnamed_addr constant [12 x i8] c\"assert false\\00\"\n");
    cg.output.push_str("@.file = private unnamed_addr constant [1 x i8] c\"\\00\"\n");
    cg.output.push_str("@.fmt.s = private unnamed_addr constant [3 x i8] c\"%s\\00\"\n");
    let int_fmt = platform.int_format();
    cg.output.push_str(&format!(
        "@.fmt.i = private unnamed_addr constant [{} x i8] c\"{int_fmt}\\00\"\n",
        int_fmt.len() + 1
    ));
    cg.output.push_str("@.fmt.f = private unnamed_addr constant [4 x i8] c\"%lf\\00\"\n");
    cg.output.push_str("@.fmt.c = private unnamed_addr constant [3 x i8] c\"%c\\00\"\n");
    let nl_bytes = platform.newline();
    let nl_len = match platform {
        Platform::Posix => 2,
        Platform::Win32 => 3,
    };
    cg.output
        .push_str(&format!("@.fmt.nl = private unnamed_addr constant [{nl_len} x i8] c\"{nl_bytes}\\00\"\n"));
    cg.output.push_str("@.nlbytes = private unnamed_addr constant [1 x i8] c\"\\00\"\n");
}

fn lower_function(cg: &mut CodeGen, unit: &Unit, f: &FunctionDef) -> Result<(), CodeGenError> {
    let body = f.body.as_ref().expect("lower_function called on a declaration-only def");
    let ret_ty = f.return_type.clone();
    let ret_ir = ret_ty.as_ref().map(|t| t.generate_ir_type()).unwrap_or_else(|| "void".to_string());

    let params_ir: Vec<String> = f
        .params
        .iter()
        .map(|p| {
            if p.by_reference {
                format!("ptr %{}", p.name)
            } else {
                format!("{} %{}", p.ty.generate_ir_type(), p.name)
            }
        })
        .collect();

    cg.output
        .push_str(&format!("define {ret_ir} @{}({}) {{\n", f.name, params_ir.join(", ")));
    cg.output.push_str("entry:\n");
    cg.enter_function(&f.name, ret_ty.clone());

    for p in &f.params {
        if p.by_reference {
            cg.current_mut().declare(&p.name, NamedAlloc { ptr: format!("%{}", p.name), ty: p.ty.clone() });
        } else {
            let slot = cg.new_temp();
            cg.output.push_str(&format!("  {slot} = alloca {}\n", p.ty.generate_ir_type()));
            cg.output
                .push_str(&format!("  store {} %{}, ptr {slot}\n", p.ty.generate_ir_type(), p.name));
            cg.current_mut().declare(&p.name, NamedAlloc { ptr: slot, ty: p.ty.clone() });
        }
    }

    declare_locals(cg, unit, body)?;

    for stmt in &body.statements {
        lower_statement(cg, unit, stmt)?;
    }

    if !cg.current_ref().explicit_return {
        match &ret_ty {
            Some(ty) => {
                let result = cg
                    .current_ref()
                    .lookup("result")
                    .cloned()
                    .ok_or_else(|| CodeGenError::Logic(format!("function '{}' never binds result", f.name)))?;
                let loaded = cg.new_temp();
                cg.output
                    .push_str(&format!("  {loaded} = load {}, ptr {}\n", ty.generate_ir_type(), result.ptr));
                cg.output.push_str(&format!("  ret {} {loaded}\n", ty.generate_ir_type()));
            }
            None => cg.output.push_str("  ret void\n"),
        }
    }

    cg.output.push_str("}\n");
    cg.leave_function();
    Ok(())
}

fn lower_main(cg: &mut CodeGen, unit: &Unit, block: &Block) -> Result<(), CodeGenError> {
    cg.output.push_str("define i32 @main() {\n");
    cg.output.push_str("entry:\n");
    cg.enter_function("main", None);

    declare_locals(cg, unit, block)?;

    for stmt in &block.statements {
        lower_statement(cg, unit, stmt)?;
    }

    if !cg.current_ref().explicit_return {
        cg.output.push_str("  ret i32 0\n");
    }
    cg.output.push_str("}\n");
    cg.leave_function();
    Ok(())
}

fn declare_locals(cg: &mut CodeGen, unit: &Unit, block: &Block) -> Result<(), CodeGenError> {
    for v in block.consts.iter().chain(block.vars.iter()) {
        declare_local(cg, unit, v)?;
    }
    Ok(())
}

fn declare_local(cg: &mut CodeGen, unit: &Unit, v: &VariableDef) -> Result<(), CodeGenError> {
    let ir_ty = v.ty.generate_ir_type();
    let slot = cg.new_temp();
    cg.output.push_str(&format!("  {slot} = alloca {ir_ty}\n"));
    cg.current_mut().declare(&v.name, NamedAlloc { ptr: slot.clone(), ty: v.ty.clone() });
    if let Some(alias) = &v.alias {
        cg.current_mut().declare(alias, NamedAlloc { ptr: slot.clone(), ty: v.ty.clone() });
    }
    if let Some(init) = &v.initializer {
        let (val, _) = super::statements::lower_expr(cg, unit, init)?;
        cg.output.push_str(&format!("  store {ir_ty} {val}, ptr {slot}\n"));
    } else if v.ty == Type::String {
        let (val, _) = super::statements::lower_expr(cg, unit, &crate::ast::Expr::StringLiteral(String::new()))?;
        cg.output.push_str(&format!("  store {ir_ty} {val}, ptr {slot}\n"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn diagnostics_globals_pick_win32_newline_and_int_format() {
        let registry = TypeRegistry::new();
        let mut cg = CodeGen::new(&registry);
        emit_diagnostics_globals(&mut cg, Platform::Win32);
        assert!(cg.output.contains("@.fmt.i = private unnamed_addr constant [5 x i8] c\"%lli\\00\""));
        assert!(cg.output.contains("@.fmt.nl = private unnamed_addr constant [3 x i8] c\"\\0D\\0A\\00\""));
    }

    #[test]
    fn diagnostics_globals_pick_posix_newline_and_int_format() {
        let registry = TypeRegistry::new();
        let mut cg = CodeGen::new(&registry);
        emit_diagnostics_globals(&mut cg, Platform::Posix);
        assert!(cg.output.contains("@.fmt.i = private unnamed_addr constant [4 x i8] c\"%ld\\00\""));
        assert!(cg.output.contains("@.fmt.nl = private unnamed_addr constant [2 x i8] c\"\\0A\\00\""));
    }
}
