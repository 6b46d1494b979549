//! Statement and expression lowering (C8)
//!
//! `lower_lvalue` resolves an expression to the memory address holding its
//! value; `lower_expr` resolves one to an SSA-ish value (loading through
//! `lower_lvalue` for anything that lives in memory). Keeping these
//! separate is what lets array/field/pointer targets be both read and
//! written through the same address computation.

use super::control_flow;
use super::error::CodeGenError;
use super::intrinsics::{self, Platform};
use super::state::{CodeGen, NamedAlloc};
use super::types::field_gep;
use crate::ast::{BinOp, CompareOp, Expr, LogicalOp, Statement, Unit};
use crate::types::Type;

type CgResult = Result<(String, Type), CodeGenError>;

pub fn lower_statement(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    match stmt {
        Statement::Assign { target, value, .. } => lower_assign(cg, unit, target, value),
        Statement::Call { call, .. } => {
            lower_expr(cg, unit, call)?;
            Ok(())
        }
        Statement::If { .. } => control_flow::lower_if(cg, unit, stmt),
        Statement::While { .. } => control_flow::lower_while(cg, unit, stmt),
        Statement::Repeat { .. } => control_flow::lower_repeat(cg, unit, stmt),
        Statement::For { .. } => control_flow::lower_for(cg, unit, stmt),
        Statement::ForIn { .. } => control_flow::lower_for_in(cg, unit, stmt),
        Statement::Case { .. } => control_flow::lower_case(cg, unit, stmt),
        Statement::Break { .. } => control_flow::lower_break(cg),
        Statement::Block(block) => {
            cg.current_mut().push_scope();
            for s in &block.statements {
                lower_statement(cg, unit, s)?;
            }
            cg.current_mut().pop_scope();
            Ok(())
        }
    }
}

fn lower_assign(cg: &mut CodeGen, unit: &Unit, target: &Expr, value: &Expr) -> Result<(), CodeGenError> {
    let (target_ptr, target_ty) = lower_lvalue(cg, unit, target)?;

    if matches!(target_ty, Type::Record { .. }) {
        let (src_ptr, _) = lower_lvalue(cg, unit, value)?;
        let size_ptr = cg.new_temp();
        let elem_ir = target_ty.generate_ir_type();
        cg.output
            .push_str(&format!("  {size_ptr} = getelementptr {elem_ir}, ptr null, i64 1\n"));
        let size = cg.new_temp();
        cg.output.push_str(&format!("  {size} = ptrtoint ptr {size_ptr} to i64\n"));
        cg.output.push_str(&format!(
            "  call void @llvm.memcpy.p0.p0.i64(ptr {target_ptr}, ptr {src_ptr}, i64 {size}, i1 false)\n"
        ));
        return Ok(());
    }

    let (value_reg, value_ty) = lower_expr(cg, unit, value)?;
    let coerced = coerce(cg, &value_reg, &value_ty, &target_ty)?;
    cg.output
        .push_str(&format!("  store {} {coerced}, ptr {target_ptr}\n", target_ty.generate_ir_type()));
    Ok(())
}

/// Widens/narrows a value to `target`, per the same numeric-promotion
/// rules `resolve_type` uses to decide whether the assignment typechecks.
pub(crate) fn coerce(cg: &mut CodeGen, reg: &str, from: &Type, target: &Type) -> Result<String, CodeGenError> {
    match (from, target) {
        (Type::Integer { width: w1 }, Type::Integer { width: w2 }) if w1 != w2 => {
            let t = cg.new_temp();
            if w1 < w2 {
                cg.output.push_str(&format!("  {t} = sext i{w1} {reg} to i{w2}\n"));
            } else {
                cg.output.push_str(&format!("  {t} = trunc i{w1} {reg} to i{w2}\n"));
            }
            Ok(t)
        }
        (Type::Integer { .. }, Type::Double | Type::Single) => {
            let t = cg.new_temp();
            let to = target.generate_ir_type();
            cg.output
                .push_str(&format!("  {t} = sitofp {} {reg} to {to}\n", from.generate_ir_type()));
            Ok(t)
        }
        (Type::Single, Type::Double) => {
            let t = cg.new_temp();
            cg.output.push_str(&format!("  {t} = fpext float {reg} to double\n"));
            Ok(t)
        }
        (Type::Character, Type::String) => {
            let t = cg.new_temp();
            cg.output.push_str(&format!(
                "  {t} = call {} @char_to_string(i8 {reg})\n",
                Type::String.generate_ir_type()
            ));
            Ok(t)
        }
        _ => Ok(reg.to_string()),
    }
}

/// Resolves `expr` to the address of its storage, for assignment targets
/// and any expression whose value needs to be addressed (array/record
/// member access, `@x`).
pub fn lower_lvalue(cg: &mut CodeGen, unit: &Unit, expr: &Expr) -> Result<(String, Type), CodeGenError> {
    match expr {
        Expr::Variable { name, deref, .. } => {
            let NamedAlloc { ptr, ty } = cg
                .current_ref()
                .lookup(name)
                .cloned()
                .ok_or_else(|| CodeGenError::Logic(format!("undeclared variable '{name}'")))?;
            if *deref {
                let pointee = match &ty {
                    Type::Pointer { base: Some(b) } => (**b).clone(),
                    _ => return Err(CodeGenError::Logic(format!("'{name}' is not a pointer"))),
                };
                let loaded = cg.new_temp();
                cg.output.push_str(&format!("  {loaded} = load ptr, ptr {ptr}\n"));
                Ok((loaded, pointee))
            } else {
                Ok((ptr, ty))
            }
        }
        Expr::FieldAccess { base, field, .. } => {
            let (base_ptr, base_ty) = lower_lvalue(cg, unit, base)?;
            let (idx, field_ty) = field_gep(&base_ty, field)
                .ok_or_else(|| CodeGenError::Logic(format!("unknown field '{field}'")))?;
            let gep = cg.new_temp();
            cg.output.push_str(&format!(
                "  {gep} = getelementptr inbounds {}, ptr {base_ptr}, i32 0, i32 {idx}\n",
                base_ty.generate_ir_type()
            ));
            Ok((gep, field_ty))
        }
        Expr::ArrayAccess { base, index, .. } => lower_array_access(cg, unit, base, index),
        Expr::AddressOf { base, .. } => lower_lvalue(cg, unit, base),
        other => Err(CodeGenError::Logic(format!("expression is not assignable: {other:?}"))),
    }
}

fn lower_array_access(
    cg: &mut CodeGen,
    unit: &Unit,
    base: &Expr,
    index: &Expr,
) -> Result<(String, Type), CodeGenError> {
    let (base_ptr, base_ty) = lower_lvalue(cg, unit, base)?;
    let (idx_val, _) = lower_expr(cg, unit, index)?;
    let access_text = format!("{}[{}]", render_expr(base), render_expr(index));

    match &base_ty {
        Type::FixedArray { lo, hi, element } => {
            emit_range_check(cg, &idx_val, &lo.to_string(), &hi.to_string(), &access_text);
            let adjusted = cg.new_temp();
            cg.output.push_str(&format!("  {adjusted} = sub i64 {idx_val}, {lo}\n"));
            let gep = cg.new_temp();
            cg.output.push_str(&format!(
                "  {gep} = getelementptr inbounds {}, ptr {base_ptr}, i64 0, i64 {adjusted}\n",
                base_ty.generate_ir_type()
            ));
            Ok((gep, (**element).clone()))
        }
        Type::DynArray { element } => {
            let len_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {len_field} = getelementptr inbounds {}, ptr {base_ptr}, i32 0, i32 0\n",
                base_ty.generate_ir_type()
            ));
            let len = cg.new_temp();
            cg.output.push_str(&format!("  {len} = load i64, ptr {len_field}\n"));
            let high = cg.new_temp();
            cg.output.push_str(&format!("  {high} = sub i64 {len}, 1\n"));
            emit_range_check(cg, &idx_val, "0", &high, &access_text);

            let data_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {data_field} = getelementptr inbounds {}, ptr {base_ptr}, i32 0, i32 1\n",
                base_ty.generate_ir_type()
            ));
            let data = cg.new_temp();
            cg.output.push_str(&format!("  {data} = load ptr, ptr {data_field}\n"));
            let gep = cg.new_temp();
            cg.output.push_str(&format!(
                "  {gep} = getelementptr inbounds {}, ptr {data}, i64 {idx_val}\n",
                element.generate_ir_type()
            ));
            Ok((gep, (**element).clone()))
        }
        Type::String => {
            let len_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {len_field} = getelementptr inbounds {}, ptr {base_ptr}, i32 0, i32 1\n",
                base_ty.generate_ir_type()
            ));
            let len = cg.new_temp();
            cg.output.push_str(&format!("  {len} = load i64, ptr {len_field}\n"));
            let high = cg.new_temp();
            cg.output.push_str(&format!("  {high} = sub i64 {len}, 2\n"));
            emit_range_check(cg, &idx_val, "0", &high, &access_text);

            let data_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {data_field} = getelementptr inbounds {}, ptr {base_ptr}, i32 0, i32 2\n",
                base_ty.generate_ir_type()
            ));
            let data = cg.new_temp();
            cg.output.push_str(&format!("  {data} = load ptr, ptr {data_field}\n"));
            let gep = cg.new_temp();
            cg.output
                .push_str(&format!("  {gep} = getelementptr inbounds i8, ptr {data}, i64 {idx_val}\n"));
            Ok((gep, Type::Character))
        }
        other => Err(CodeGenError::Logic(format!("'{}' is not indexable", other.type_name()))),
    }
}

/// Emits `lo <= index_reg <= high`, trapping through the platform
/// assert-fail symbol with a message naming the offending access.
/// `low`/`high` must already be real operands (constants or registers),
/// never a placeholder string referencing an undefined SSA name.
fn emit_range_check(cg: &mut CodeGen, index_reg: &str, low: &str, high: &str, access_text: &str) {
    let lo_ok = cg.new_temp();
    let hi_ok = cg.new_temp();
    let ok = cg.new_temp();
    cg.output.push_str(&format!("  {lo_ok} = icmp sge i64 {index_reg}, {low}\n"));
    cg.output.push_str(&format!("  {hi_ok} = icmp sle i64 {index_reg}, {high}\n"));
    cg.output.push_str(&format!("  {ok} = and i1 {lo_ok}, {hi_ok}\n"));
    let fail = cg.new_label("range_fail");
    let pass = cg.new_label("range_ok");
    let bad = cg.new_temp();
    cg.output.push_str(&format!("  {bad} = xor i1 {ok}, 1\n"));
    cg.output.push_str(&format!("  br i1 {bad}, label %{fail}, label %{pass}\n"));
    cg.output.push_str(&format!("{fail}:\n"));
    let message = format!("index out of range for expression: {access_text}");
    let msg_global = cg.new_string_global();
    let byte_len = message.len() + 1;
    cg.string_globals.push_str(&format!(
        "{msg_global} = private unnamed_addr constant [{byte_len} x i8] c\"{}\\00\"\n",
        escape_ir_string(&message)
    ));
    let msg_ptr = cg.new_temp();
    cg.output.push_str(&format!(
        "  {msg_ptr} = getelementptr inbounds [{byte_len} x i8], ptr {msg_global}, i64 0, i64 0\n"
    ));
    cg.output.push_str(&format!(
        "  call void @{}(ptr {msg_ptr}, ptr @.file, i32 0)\n",
        Platform::host().assert_fail_symbol()
    ));
    cg.output.push_str("  unreachable\n");
    cg.output.push_str(&format!("{pass}:\n"));
}

/// Renders an expression back to Pascal-ish source text for diagnostics
/// (range-check messages). Not a general pretty-printer — only as much
/// as index expressions actually need.
fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::IntLiteral(v) => v.to_string(),
        Expr::RealLiteral(v) => v.to_string(),
        Expr::BoolLiteral(b) => b.to_string(),
        Expr::CharLiteral(c) => format!("'{c}'"),
        Expr::StringLiteral(s) => format!("'{s}'"),
        Expr::Nil => "nil".to_string(),
        Expr::Variable { name, deref, .. } => {
            if *deref {
                format!("{name}^")
            } else {
                name.clone()
            }
        }
        Expr::FieldAccess { base, field, .. } => format!("{}.{field}", render_expr(base)),
        Expr::ArrayAccess { base, index, .. } => format!("{}[{}]", render_expr(base), render_expr(index)),
        Expr::AddressOf { base, .. } => format!("@{}", render_expr(base)),
        Expr::UnaryMinus { operand, .. } => format!("-{}", render_expr(operand)),
        Expr::Not { operand, .. } => format!("not {}", render_expr(operand)),
        Expr::Binary { op, lhs, rhs, .. } => {
            let sym = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Mod => "mod",
                BinOp::IntDiv => "div",
            };
            format!("{} {sym} {}", render_expr(lhs), render_expr(rhs))
        }
        Expr::Compare { op, lhs, rhs, .. } => {
            let sym = match op {
                CompareOp::Eq => "=",
                CompareOp::NotEq => "<>",
                CompareOp::Lt => "<",
                CompareOp::LtEq => "<=",
                CompareOp::Gt => ">",
                CompareOp::GtEq => ">=",
            };
            format!("{} {sym} {}", render_expr(lhs), render_expr(rhs))
        }
        Expr::Logical { op, lhs, rhs, .. } => {
            let sym = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            format!("{} {sym} {}", render_expr(lhs), render_expr(rhs))
        }
        Expr::Call { name, args, .. } => {
            format!("{name}({})", args.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
        Expr::TypeNode { type_name, .. } => type_name.clone(),
    }
}

pub fn lower_expr(cg: &mut CodeGen, unit: &Unit, expr: &Expr) -> CgResult {
    match expr {
        Expr::IntLiteral(v) => Ok((v.to_string(), Type::Integer { width: 32 })),
        Expr::RealLiteral(v) => Ok((format!("{v:?}"), Type::Double)),
        Expr::BoolLiteral(b) => Ok(((*b as i32).to_string(), Type::Boolean)),
        Expr::CharLiteral(c) => Ok(((*c as u32).to_string(), Type::Character)),
        Expr::StringLiteral(s) => Ok(lower_string_literal(cg, s)),
        Expr::Nil => Ok(("null".to_string(), Type::Pointer { base: None })),
        Expr::Variable { .. } | Expr::FieldAccess { .. } | Expr::ArrayAccess { .. } => {
            let (ptr, ty) = lower_lvalue(cg, unit, expr)?;
            if matches!(ty, Type::FixedArray { .. }) {
                return Ok((ptr, ty));
            }
            let temp = cg.new_temp();
            cg.output
                .push_str(&format!("  {temp} = load {}, ptr {ptr}\n", ty.generate_ir_type()));
            Ok((temp, ty))
        }
        Expr::AddressOf { base, .. } => {
            let (ptr, ty) = lower_lvalue(cg, unit, base)?;
            Ok((ptr, Type::Pointer { base: Some(Box::new(ty)) }))
        }
        Expr::UnaryMinus { operand, .. } => {
            let (val, ty) = lower_expr(cg, unit, operand)?;
            let temp = cg.new_temp();
            match &ty {
                Type::Double | Type::Single => {
                    cg.output.push_str(&format!("  {temp} = fneg {} {val}\n", ty.generate_ir_type()));
                }
                _ => {
                    cg.output
                        .push_str(&format!("  {temp} = sub {} 0, {val}\n", ty.generate_ir_type()));
                }
            }
            Ok((temp, ty))
        }
        Expr::Not { operand, .. } => {
            let (val, _) = lower_expr(cg, unit, operand)?;
            let temp = cg.new_temp();
            cg.output.push_str(&format!("  {temp} = xor i1 {val}, 1\n"));
            Ok((temp, Type::Boolean))
        }
        Expr::Binary { op, lhs, rhs, .. } => lower_binary(cg, unit, op.clone(), lhs, rhs),
        Expr::Compare { op, lhs, rhs, .. } => lower_compare(cg, unit, op.clone(), lhs, rhs),
        Expr::Logical { op, lhs, rhs, .. } => {
            let (l, _) = lower_expr(cg, unit, lhs)?;
            let (r, _) = lower_expr(cg, unit, rhs)?;
            let temp = cg.new_temp();
            let instr = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            cg.output.push_str(&format!("  {temp} = {instr} i1 {l}, {r}\n"));
            Ok((temp, Type::Boolean))
        }
        Expr::Call { name, args, .. } => lower_call(cg, unit, name, args),
        Expr::TypeNode { type_name, .. } => {
            let ty = unit.types.lookup(type_name).or_else(|| unit.interface_types.lookup(type_name)).cloned().unwrap_or(Type::Unknown);
            Ok(("0".to_string(), ty))
        }
    }
}

fn lower_string_literal(cg: &mut CodeGen, s: &str) -> (String, Type) {
    let global = cg.new_string_global();
    let byte_len = s.len() + 1;
    cg.string_globals.push_str(&format!(
        "{global} = private unnamed_addr constant [{byte_len} x i8] c\"{}\\00\"\n",
        escape_ir_string(s)
    ));
    let data_ptr = cg.new_temp();
    cg.output.push_str(&format!(
        "  {data_ptr} = getelementptr inbounds [{byte_len} x i8], ptr {global}, i64 0, i64 0\n"
    ));
    let ty = Type::String;
    let ir_ty = ty.generate_ir_type();
    let t1 = cg.new_temp();
    cg.output.push_str(&format!("  {t1} = insertvalue {ir_ty} undef, i64 0, 0\n"));
    let t2 = cg.new_temp();
    cg.output
        .push_str(&format!("  {t2} = insertvalue {ir_ty} {t1}, i64 {byte_len}, 1\n"));
    let t3 = cg.new_temp();
    cg.output
        .push_str(&format!("  {t3} = insertvalue {ir_ty} {t2}, ptr {data_ptr}, 2\n"));
    (t3, ty)
}

fn escape_ir_string(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\22"),
            b'\\' => out.push_str("\\5C"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{b:02X}")),
        }
    }
    out
}

fn lower_binary(cg: &mut CodeGen, unit: &Unit, op: BinOp, lhs: &Expr, rhs: &Expr) -> CgResult {
    let (lval, lty) = lower_expr(cg, unit, lhs)?;
    let (rval, rty) = lower_expr(cg, unit, rhs)?;

    if lty == Type::String && rty == Type::Character {
        return Ok(concat_string_char(cg, &lval, &rval));
    }
    if lty == Type::String && rty == Type::String {
        return Ok(concat_string_string(cg, &lval, &rval));
    }

    let is_float = matches!(lty, Type::Double | Type::Single) || matches!(rty, Type::Double | Type::Single);
    if is_float {
        let l = to_double(cg, &lval, &lty);
        let r = to_double(cg, &rval, &rty);
        let instr = match op {
            BinOp::Add => "fadd",
            BinOp::Sub => "fsub",
            BinOp::Mul => "fmul",
            BinOp::Div => "fdiv",
            BinOp::Mod => "frem",
            BinOp::IntDiv => "fdiv",
        };
        let temp = cg.new_temp();
        cg.output.push_str(&format!("  {temp} = {instr} double {l}, {r}\n"));
        return Ok((temp, Type::Double));
    }

    let w1 = lty.width();
    let w2 = rty.width();
    let width = w1.max(w2);
    let l = sext_to(cg, &lval, w1, width);
    let r = sext_to(cg, &rval, w2, width);
    let instr = match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "sdiv",
        BinOp::IntDiv => "sdiv",
        BinOp::Mod => "srem",
    };
    let temp = cg.new_temp();
    cg.output.push_str(&format!("  {temp} = {instr} i{width} {l}, {r}\n"));
    Ok((temp, Type::Integer { width }))
}

fn sext_to(cg: &mut CodeGen, val: &str, from: u8, to: u8) -> String {
    if from == to {
        return val.to_string();
    }
    let temp = cg.new_temp();
    cg.output.push_str(&format!("  {temp} = sext i{from} {val} to i{to}\n"));
    temp
}

fn to_double(cg: &mut CodeGen, val: &str, ty: &Type) -> String {
    match ty {
        Type::Double => val.to_string(),
        Type::Single => {
            let temp = cg.new_temp();
            cg.output.push_str(&format!("  {temp} = fpext float {val} to double\n"));
            temp
        }
        Type::Integer { width } => {
            let temp = cg.new_temp();
            cg.output.push_str(&format!("  {temp} = sitofp i{width} {val} to double\n"));
            temp
        }
        _ => val.to_string(),
    }
}

/// `lhs + char`: length becomes `lhs.length + 1` per the concatenation
/// law (the terminating NUL is overwritten by the appended byte, then a
/// fresh NUL follows it).
fn concat_string_char(cg: &mut CodeGen, lhs: &str, rhs_char: &str) -> (String, Type) {
    let ir_ty = Type::String.generate_ir_type();
    let lhs_len = cg.new_temp();
    cg.output.push_str(&format!("  {lhs_len} = extractvalue {ir_ty} {lhs}, 1\n"));
    let lhs_data = cg.new_temp();
    cg.output.push_str(&format!("  {lhs_data} = extractvalue {ir_ty} {lhs}, 2\n"));
    let new_len = cg.new_temp();
    cg.output.push_str(&format!("  {new_len} = add i64 {lhs_len}, 1\n"));
    let buf = cg.new_temp();
    cg.output.push_str(&format!("  {buf} = call ptr @malloc(i64 {new_len})\n"));
    cg.output.push_str(&format!(
        "  call void @llvm.memcpy.p0.p0.i64(ptr {buf}, ptr {lhs_data}, i64 {lhs_len}, i1 false)\n"
    ));
    let tail = cg.new_temp();
    cg.output
        .push_str(&format!("  {tail} = getelementptr inbounds i8, ptr {buf}, i64 {lhs_len}\n"));
    let ch8 = cg.new_temp();
    cg.output.push_str(&format!("  {ch8} = trunc i32 {rhs_char} to i8\n"));
    cg.output.push_str(&format!("  store i8 {ch8}, ptr {tail}\n"));
    build_string_value(cg, &new_len, &buf)
}

/// `lhs + rhs`: combined length is `lhs.length + rhs.length - 1`
/// (both lengths already include their own terminating NUL, and the
/// combined buffer keeps only one).
fn concat_string_string(cg: &mut CodeGen, lhs: &str, rhs: &str) -> (String, Type) {
    let ir_ty = Type::String.generate_ir_type();
    let lhs_len = cg.new_temp();
    cg.output.push_str(&format!("  {lhs_len} = extractvalue {ir_ty} {lhs}, 1\n"));
    let lhs_data = cg.new_temp();
    cg.output.push_str(&format!("  {lhs_data} = extractvalue {ir_ty} {lhs}, 2\n"));
    let rhs_len = cg.new_temp();
    cg.output.push_str(&format!("  {rhs_len} = extractvalue {ir_ty} {rhs}, 1\n"));
    let rhs_data = cg.new_temp();
    cg.output.push_str(&format!("  {rhs_data} = extractvalue {ir_ty} {rhs}, 2\n"));
    let sum = cg.new_temp();
    cg.output.push_str(&format!("  {sum} = add i64 {lhs_len}, {rhs_len}\n"));
    let new_len = cg.new_temp();
    cg.output.push_str(&format!("  {new_len} = sub i64 {sum}, 1\n"));
    let buf = cg.new_temp();
    cg.output.push_str(&format!("  {buf} = call ptr @malloc(i64 {new_len})\n"));
    let lhs_copy_len = cg.new_temp();
    cg.output.push_str(&format!("  {lhs_copy_len} = sub i64 {lhs_len}, 1\n"));
    cg.output.push_str(&format!(
        "  call void @llvm.memcpy.p0.p0.i64(ptr {buf}, ptr {lhs_data}, i64 {lhs_copy_len}, i1 false)\n"
    ));
    let tail = cg.new_temp();
    cg.output
        .push_str(&format!("  {tail} = getelementptr inbounds i8, ptr {buf}, i64 {lhs_copy_len}\n"));
    cg.output.push_str(&format!(
        "  call void @llvm.memcpy.p0.p0.i64(ptr {tail}, ptr {rhs_data}, i64 {rhs_len}, i1 false)\n"
    ));
    build_string_value(cg, &new_len, &buf)
}

fn build_string_value(cg: &mut CodeGen, len: &str, data: &str) -> (String, Type) {
    let ir_ty = Type::String.generate_ir_type();
    let t1 = cg.new_temp();
    // refCount field always 0; nothing ever increments or frees it.
    cg.output.push_str(&format!("  {t1} = insertvalue {ir_ty} undef, i64 0, 0\n"));
    let t2 = cg.new_temp();
    cg.output.push_str(&format!("  {t2} = insertvalue {ir_ty} {t1}, i64 {len}, 1\n"));
    let t3 = cg.new_temp();
    cg.output.push_str(&format!("  {t3} = insertvalue {ir_ty} {t2}, ptr {data}, 2\n"));
    (t3, Type::String)
}

fn lower_compare(cg: &mut CodeGen, unit: &Unit, op: CompareOp, lhs: &Expr, rhs: &Expr) -> CgResult {
    let (lval, lty) = lower_expr(cg, unit, lhs)?;
    let (rval, rty) = lower_expr(cg, unit, rhs)?;

    if lty == Type::String && rty == Type::String {
        let ir_ty = Type::String.generate_ir_type();
        let ldata = cg.new_temp();
        cg.output.push_str(&format!("  {ldata} = extractvalue {ir_ty} {lval}, 2\n"));
        let rdata = cg.new_temp();
        cg.output.push_str(&format!("  {rdata} = extractvalue {ir_ty} {rval}, 2\n"));
        let cmp = cg.new_temp();
        cg.output
            .push_str(&format!("  {cmp} = call i32 @comparestr(ptr {ldata}, ptr {rdata})\n"));
        let temp = cg.new_temp();
        let pred = match op {
            CompareOp::Eq => "eq",
            CompareOp::NotEq => "ne",
            CompareOp::Lt => "slt",
            CompareOp::LtEq => "sle",
            CompareOp::Gt => "sgt",
            CompareOp::GtEq => "sge",
        };
        cg.output.push_str(&format!("  {temp} = icmp {pred} i32 {cmp}, 0\n"));
        return Ok((temp, Type::Boolean));
    }

    let is_float = matches!(lty, Type::Double | Type::Single) || matches!(rty, Type::Double | Type::Single);
    let temp = cg.new_temp();
    if is_float {
        let l = to_double(cg, &lval, &lty);
        let r = to_double(cg, &rval, &rty);
        let pred = match op {
            CompareOp::Eq => "oeq",
            CompareOp::NotEq => "one",
            CompareOp::Lt => "olt",
            CompareOp::LtEq => "ole",
            CompareOp::Gt => "ogt",
            CompareOp::GtEq => "oge",
        };
        cg.output.push_str(&format!("  {temp} = fcmp {pred} double {l}, {r}\n"));
    } else {
        let width = lty.width().max(rty.width());
        let l = sext_to(cg, &lval, lty.width(), width);
        let r = sext_to(cg, &rval, rty.width(), width);
        let pred = match op {
            CompareOp::Eq => "eq",
            CompareOp::NotEq => "ne",
            CompareOp::Lt => "slt",
            CompareOp::LtEq => "sle",
            CompareOp::Gt => "sgt",
            CompareOp::GtEq => "sge",
        };
        cg.output.push_str(&format!("  {temp} = icmp {pred} i{width} {l}, {r}\n"));
    }
    Ok((temp, Type::Boolean))
}

fn lower_call(cg: &mut CodeGen, unit: &Unit, name: &str, args: &[Expr]) -> CgResult {
    if intrinsics::is_system_call(name) {
        return intrinsics::lower_system_call(cg, unit, Platform::host(), name, args);
    }

    let def = unit
        .function_by_name(name)
        .cloned()
        .ok_or_else(|| CodeGenError::Logic(format!("call to unknown function '{name}'")))?;

    let mut rendered = Vec::new();
    for (param, arg) in def.params.iter().zip(args.iter()) {
        if param.by_reference {
            let (ptr, _) = lower_lvalue(cg, unit, arg)?;
            rendered.push(format!("ptr {ptr}"));
        } else {
            let (val, ty) = lower_expr(cg, unit, arg)?;
            rendered.push(format!("{} {val}", ty.generate_ir_type()));
        }
    }

    let ret_ty = def.return_type.clone().unwrap_or(Type::Unknown);
    let call_name = def.external_name.clone().unwrap_or_else(|| def.name.clone());
    if ret_ty == Type::Unknown {
        cg.output
            .push_str(&format!("  call void @{}({})\n", call_name, rendered.join(", ")));
        Ok(("0".to_string(), Type::Unknown))
    } else {
        let temp = cg.new_temp();
        cg.output.push_str(&format!(
            "  {temp} = call {} @{}({})\n",
            ret_ty.generate_ir_type(),
            call_name,
            rendered.join(", ")
        ));
        Ok((temp, ret_ty))
    }
}
