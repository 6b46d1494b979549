//! Control-flow lowering (C8): if/while/repeat/for/for-in/case/break.
//!
//! Everything here is alloca/branch based, not phi based — a loop index
//! lives in its own `alloca` and is reloaded at each use, which keeps
//! every block single-entry without needing predecessor tracking.

use super::error::CodeGenError;
use super::state::{CodeGen, NamedAlloc};
use super::statements::{lower_expr, lower_lvalue, lower_statement};
use crate::ast::{CaseArm, Statement, Unit};
use crate::types::Type;

fn lower_body(cg: &mut CodeGen, unit: &Unit, body: &[Statement]) -> Result<(), CodeGenError> {
    for s in body {
        lower_statement(cg, unit, s)?;
    }
    Ok(())
}

pub fn lower_if(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::If { cond, then_branch, else_branch, .. } = stmt else {
        unreachable!()
    };
    let (cond_val, _) = lower_expr(cg, unit, cond)?;
    let then_label = cg.new_label("if_then");
    let else_label = cg.new_label("if_else");
    let end_label = cg.new_label("if_end");

    cg.output
        .push_str(&format!("  br i1 {cond_val}, label %{then_label}, label %{else_label}\n"));
    cg.output.push_str(&format!("{then_label}:\n"));
    lower_body(cg, unit, then_branch)?;
    cg.output.push_str(&format!("  br label %{end_label}\n"));
    cg.output.push_str(&format!("{else_label}:\n"));
    if let Some(else_stmts) = else_branch {
        lower_body(cg, unit, else_stmts)?;
    }
    cg.output.push_str(&format!("  br label %{end_label}\n"));
    cg.output.push_str(&format!("{end_label}:\n"));
    Ok(())
}

pub fn lower_while(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::While { cond, body, .. } = stmt else { unreachable!() };
    let head = cg.new_label("while_head");
    let body_label = cg.new_label("while_body");
    let end = cg.new_label("while_end");

    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{head}:\n"));
    let (cond_val, _) = lower_expr(cg, unit, cond)?;
    cg.output
        .push_str(&format!("  br i1 {cond_val}, label %{body_label}, label %{end}\n"));
    cg.output.push_str(&format!("{body_label}:\n"));
    cg.current_mut().break_targets.push(end.clone());
    lower_body(cg, unit, body)?;
    cg.current_mut().break_targets.pop();
    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{end}:\n"));
    Ok(())
}

pub fn lower_repeat(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::Repeat { body, cond, .. } = stmt else { unreachable!() };
    let body_label = cg.new_label("repeat_body");
    let end = cg.new_label("repeat_end");

    cg.output.push_str(&format!("  br label %{body_label}\n"));
    cg.output.push_str(&format!("{body_label}:\n"));
    cg.current_mut().break_targets.push(end.clone());
    lower_body(cg, unit, body)?;
    cg.current_mut().break_targets.pop();
    let (cond_val, _) = lower_expr(cg, unit, cond)?;
    cg.output
        .push_str(&format!("  br i1 {cond_val}, label %{end}, label %{body_label}\n"));
    cg.output.push_str(&format!("{end}:\n"));
    Ok(())
}

pub fn lower_for(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::For { var, start, end: end_expr, downto, body, .. } = stmt else {
        unreachable!()
    };
    let (start_val, var_ty) = lower_expr(cg, unit, start)?;
    let ir_ty = var_ty.generate_ir_type();
    let slot = cg.new_temp();
    cg.output.push_str(&format!("  {slot} = alloca {ir_ty}\n"));
    cg.output.push_str(&format!("  store {ir_ty} {start_val}, ptr {slot}\n"));
    cg.current_mut().declare(var, NamedAlloc { ptr: slot.clone(), ty: var_ty.clone() });

    let (end_val, _) = lower_expr(cg, unit, end_expr)?;
    let head = cg.new_label("for_head");
    let body_label = cg.new_label("for_body");
    let step = cg.new_label("for_step");
    let end_label = cg.new_label("for_end");

    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{head}:\n"));
    let cur = cg.new_temp();
    cg.output.push_str(&format!("  {cur} = load {ir_ty}, ptr {slot}\n"));
    let cmp = cg.new_temp();
    let pred = if *downto { "sge" } else { "sle" };
    cg.output.push_str(&format!("  {cmp} = icmp {pred} {ir_ty} {cur}, {end_val}\n"));
    cg.output
        .push_str(&format!("  br i1 {cmp}, label %{body_label}, label %{end_label}\n"));
    cg.output.push_str(&format!("{body_label}:\n"));
    cg.current_mut().break_targets.push(end_label.clone());
    lower_body(cg, unit, body)?;
    cg.current_mut().break_targets.pop();
    cg.output.push_str(&format!("  br label %{step}\n"));
    cg.output.push_str(&format!("{step}:\n"));
    let next = cg.new_temp();
    let loaded = cg.new_temp();
    cg.output.push_str(&format!("  {loaded} = load {ir_ty}, ptr {slot}\n"));
    let delta_op = if *downto { "sub" } else { "add" };
    cg.output
        .push_str(&format!("  {next} = {delta_op} {ir_ty} {loaded}, 1\n"));
    cg.output.push_str(&format!("  store {ir_ty} {next}, ptr {slot}\n"));
    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{end_label}:\n"));
    Ok(())
}

pub fn lower_for_in(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::ForIn { var, source, body, .. } = stmt else { unreachable!() };
    let (source_ptr, source_ty) = lower_lvalue(cg, unit, source)?;
    let element = match &source_ty {
        Type::DynArray { element } => (**element).clone(),
        Type::FixedArray { element, .. } => (**element).clone(),
        Type::String => Type::Character,
        other => return Err(CodeGenError::Logic(format!("'{}' is not iterable", other.type_name()))),
    };
    let elem_ir = element.generate_ir_type();

    let idx_slot = cg.new_temp();
    cg.output.push_str(&format!("  {idx_slot} = alloca i64\n"));
    let low = source_ty.generate_low_value();
    cg.output.push_str(&format!("  store i64 {low}, ptr {idx_slot}\n"));

    let var_slot = cg.new_temp();
    cg.output.push_str(&format!("  {var_slot} = alloca {elem_ir}\n"));
    cg.current_mut()
        .declare(var, NamedAlloc { ptr: var_slot.clone(), ty: element.clone() });

    let high = source_ty.generate_high_value();
    let head = cg.new_label("forin_head");
    let body_label = cg.new_label("forin_body");
    let step = cg.new_label("forin_step");
    let end_label = cg.new_label("forin_end");

    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{head}:\n"));
    let cur_idx = cg.new_temp();
    cg.output.push_str(&format!("  {cur_idx} = load i64, ptr {idx_slot}\n"));
    let cmp = cg.new_temp();
    cg.output
        .push_str(&format!("  {cmp} = icmp sle i64 {cur_idx}, {high}\n"));
    cg.output
        .push_str(&format!("  br i1 {cmp}, label %{body_label}, label %{end_label}\n"));
    cg.output.push_str(&format!("{body_label}:\n"));

    let elem_ptr = element_pointer(cg, &source_ty, &source_ptr, &cur_idx);
    let elem_val = cg.new_temp();
    cg.output
        .push_str(&format!("  {elem_val} = load {elem_ir}, ptr {elem_ptr}\n"));
    cg.output.push_str(&format!("  store {elem_ir} {elem_val}, ptr {var_slot}\n"));

    cg.current_mut().break_targets.push(end_label.clone());
    lower_body(cg, unit, body)?;
    cg.current_mut().break_targets.pop();
    cg.output.push_str(&format!("  br label %{step}\n"));
    cg.output.push_str(&format!("{step}:\n"));
    let next = cg.new_temp();
    cg.output.push_str(&format!("  {next} = add i64 {cur_idx}, 1\n"));
    cg.output.push_str(&format!("  store i64 {next}, ptr {idx_slot}\n"));
    cg.output.push_str(&format!("  br label %{head}\n"));
    cg.output.push_str(&format!("{end_label}:\n"));
    Ok(())
}

fn element_pointer(cg: &mut CodeGen, source_ty: &Type, source_ptr: &str, idx: &str) -> String {
    match source_ty {
        Type::FixedArray { element, .. } => {
            let gep = cg.new_temp();
            cg.output.push_str(&format!(
                "  {gep} = getelementptr inbounds {}, ptr {source_ptr}, i64 0, i64 {idx}\n",
                source_ty.generate_ir_type()
            ));
            let _ = element;
            gep
        }
        Type::DynArray { element } => {
            let data_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {data_field} = getelementptr inbounds {}, ptr {source_ptr}, i32 0, i32 1\n",
                source_ty.generate_ir_type()
            ));
            let data = cg.new_temp();
            cg.output.push_str(&format!("  {data} = load ptr, ptr {data_field}\n"));
            let gep = cg.new_temp();
            cg.output
                .push_str(&format!("  {gep} = getelementptr inbounds {}, ptr {data}, i64 {idx}\n", element.generate_ir_type()));
            gep
        }
        Type::String => {
            let data_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {data_field} = getelementptr inbounds {}, ptr {source_ptr}, i32 0, i32 2\n",
                source_ty.generate_ir_type()
            ));
            let data = cg.new_temp();
            cg.output.push_str(&format!("  {data} = load ptr, ptr {data_field}\n"));
            let gep = cg.new_temp();
            cg.output
                .push_str(&format!("  {gep} = getelementptr inbounds i8, ptr {data}, i64 {idx}\n"));
            gep
        }
        _ => unreachable!(),
    }
}

/// Three lowering strategies funnel into one `caseEnd` block: an integer
/// switch when every arm is a plain value list over an ordinal
/// discriminant, a string-equality cascade when the discriminant is a
/// string, and a range cascade for any `Range` arm.
pub fn lower_case(cg: &mut CodeGen, unit: &Unit, stmt: &Statement) -> Result<(), CodeGenError> {
    let Statement::Case { discriminant, arms, else_branch, .. } = stmt else {
        unreachable!()
    };
    let (disc_val, disc_ty) = lower_expr(cg, unit, discriminant)?;
    let end_label = cg.new_label("case_end");
    let else_label = cg.new_label("case_else");

    let mut arm_labels = Vec::new();
    for _ in arms {
        arm_labels.push(cg.new_label("case_arm"));
    }

    let mut next_check = cg.new_label("case_check");
    cg.output.push_str(&format!("  br label %{next_check}\n"));

    for (arm, label) in arms.iter().zip(arm_labels.iter()) {
        cg.output.push_str(&format!("{next_check}:\n"));
        let matched = match arm {
            CaseArm::Values { values, .. } => {
                let mut conds = Vec::new();
                for v in values {
                    let (v_val, v_ty) = lower_expr(cg, unit, v)?;
                    let v_val = super::statements::coerce(cg, &v_val, &v_ty, &disc_ty)?;
                    conds.push(arm_equals(cg, &disc_val, &disc_ty, &v_val));
                }
                let mut acc = conds[0].clone();
                for c in &conds[1..] {
                    let t = cg.new_temp();
                    cg.output.push_str(&format!("  {t} = or i1 {acc}, {c}\n"));
                    acc = t;
                }
                acc
            }
            CaseArm::Range { lo, hi, .. } => {
                let (lo_val, _) = lower_expr(cg, unit, lo)?;
                let (hi_val, _) = lower_expr(cg, unit, hi)?;
                let ge = cg.new_temp();
                cg.output
                    .push_str(&format!("  {ge} = icmp sge i32 {disc_val}, {lo_val}\n"));
                let le = cg.new_temp();
                cg.output
                    .push_str(&format!("  {le} = icmp sle i32 {disc_val}, {hi_val}\n"));
                let matched = cg.new_temp();
                cg.output.push_str(&format!("  {matched} = and i1 {ge}, {le}\n"));
                matched
            }
        };
        next_check = cg.new_label("case_check");
        cg.output
            .push_str(&format!("  br i1 {matched}, label %{label}, label %{next_check}\n"));
    }
    cg.output.push_str(&format!("{next_check}:\n"));
    cg.output.push_str(&format!("  br label %{else_label}\n"));

    for (arm, label) in arms.iter().zip(arm_labels.iter()) {
        cg.output.push_str(&format!("{label}:\n"));
        let body = match arm {
            CaseArm::Values { body, .. } | CaseArm::Range { body, .. } => body,
        };
        lower_body(cg, unit, body)?;
        cg.output.push_str(&format!("  br label %{end_label}\n"));
    }

    cg.output.push_str(&format!("{else_label}:\n"));
    if let Some(stmts) = else_branch {
        lower_body(cg, unit, stmts)?;
    }
    cg.output.push_str(&format!("  br label %{end_label}\n"));
    cg.output.push_str(&format!("{end_label}:\n"));
    Ok(())
}

fn arm_equals(cg: &mut CodeGen, disc_val: &str, disc_ty: &Type, arm_val: &str) -> String {
    let temp = cg.new_temp();
    if *disc_ty == Type::String {
        let ir_ty = Type::String.generate_ir_type();
        let ldata = cg.new_temp();
        cg.output
            .push_str(&format!("  {ldata} = extractvalue {ir_ty} {disc_val}, 2\n"));
        let rdata = cg.new_temp();
        cg.output
            .push_str(&format!("  {rdata} = extractvalue {ir_ty} {arm_val}, 2\n"));
        let cmp = cg.new_temp();
        cg.output
            .push_str(&format!("  {cmp} = call i32 @comparestr(ptr {ldata}, ptr {rdata})\n"));
        cg.output.push_str(&format!("  {temp} = icmp eq i32 {cmp}, 0\n"));
    } else {
        cg.output
            .push_str(&format!("  {temp} = icmp eq i32 {disc_val}, {arm_val}\n"));
    }
    temp
}

pub fn lower_break(cg: &mut CodeGen) -> Result<(), CodeGenError> {
    let target = cg
        .current_ref()
        .break_targets
        .last()
        .cloned()
        .ok_or_else(|| CodeGenError::Logic("break outside a loop".to_string()))?;
    cg.output.push_str(&format!("  br label %{target}\n"));
    let unreachable_label = cg.new_label("after_break");
    cg.output.push_str(&format!("{unreachable_label}:\n"));
    Ok(())
}
