//! Semantic checker (C7)
//!
//! Walks a `Unit`'s function bodies and main block, resolving each
//! `Expr`'s `Type` and validating the rules: strict-equality assignment
//! (with the string+char concatenation carve-out), same-type-and-numeric
//! binary ops, boolean conditions, case-arm/discriminant type equality,
//! call resolvability. `Scope` is an explicit stack of variable tables,
//! not a single flat map shared across the whole unit.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticList};
use crate::source_map::Span;
use crate::types::Type;

const SYSTEM_CALLS: &[&str] = &[
    "writeln", "write", "printf", "exit", "halt", "low", "high", "setlength", "length", "pchar",
    "new", "strdispose", "assert", "assignfile", "readln", "closefile", "reset", "rewrite", "ord",
    "chr",
];

pub struct Scope {
    frames: Vec<std::collections::HashMap<String, Type>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope { frames: vec![std::collections::HashMap::new()] }
    }

    pub fn push(&mut self) {
        self.frames.push(std::collections::HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn declare(&mut self, name: &str, ty: Type) {
        self.frames.last_mut().unwrap().insert(name.to_lowercase(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        let key = name.to_lowercase();
        self.frames.iter().rev().find_map(|f| f.get(&key))
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TypeChecker<'u> {
    unit: &'u Unit,
    pub diagnostics: DiagnosticList,
}

impl<'u> TypeChecker<'u> {
    pub fn new(unit: &'u Unit) -> Self {
        TypeChecker { unit, diagnostics: DiagnosticList::new() }
    }

    pub fn check(&mut self) {
        for function in &self.unit.functions {
            if let Some(body) = &function.body {
                let mut scope = Scope::new();
                for param in &function.params {
                    scope.declare(&param.name, param.ty.clone());
                }
                if let Some(ret) = &function.return_type {
                    scope.declare("result", ret.clone());
                    scope.declare(&function.name, ret.clone());
                }
                self.check_block(body, &mut scope);
            }
        }
        if let Some(block) = &self.unit.main_block {
            let mut scope = Scope::new();
            self.check_block(block, &mut scope);
        }
    }

    fn check_block(&mut self, block: &Block, scope: &mut Scope) {
        for v in &block.vars {
            scope.declare(&v.name, v.ty.clone());
        }
        for c in &block.consts {
            scope.declare(&c.name, c.ty.clone());
        }
        for statement in &block.statements {
            let _ = self.check_statement(statement, scope);
        }
    }

    fn check_statement(&mut self, statement: &Statement, scope: &mut Scope) -> Result<(), Diagnostic> {
        match statement {
            Statement::Assign { target, value, span } => {
                let rhs_ty = self.resolve_type(value, scope)?;
                let lhs_ty = match self.resolve_type(target, scope) {
                    Ok(ty) => ty,
                    Err(diag) => {
                        // redesign: a missing assignment target aborts this
                        // statement's check rather than continuing to
                        // dereference a type that was never resolved.
                        self.diagnostics.push(diag.clone());
                        return Err(diag);
                    }
                };
                let is_string_char_concat = lhs_ty == Type::String && rhs_ty == Type::Character;
                if lhs_ty != rhs_ty && !is_string_char_concat {
                    let diag = Diagnostic::error(
                        *span,
                        format!(
                            "cannot assign {} to variable of type {}",
                            rhs_ty.type_name(),
                            lhs_ty.type_name()
                        ),
                    );
                    self.diagnostics.push(diag.clone());
                    return Err(diag);
                }
                Ok(())
            }
            Statement::Call { call, .. } => {
                self.resolve_type(call, scope)?;
                Ok(())
            }
            Statement::If { cond, then_branch, else_branch, span } => {
                self.require_boolean(cond, scope, *span)?;
                for s in then_branch {
                    let _ = self.check_statement(s, scope);
                }
                if let Some(branch) = else_branch {
                    for s in branch {
                        let _ = self.check_statement(s, scope);
                    }
                }
                Ok(())
            }
            Statement::While { cond, body, span } | Statement::Repeat { body, cond, span } => {
                self.require_boolean(cond, scope, *span)?;
                for s in body {
                    let _ = self.check_statement(s, scope);
                }
                Ok(())
            }
            Statement::For { var, start, end, body, .. } => {
                self.resolve_type(start, scope)?;
                self.resolve_type(end, scope)?;
                if scope.lookup(var).is_none() {
                    scope.declare(var, Type::Integer { width: 32 });
                }
                for s in body {
                    let _ = self.check_statement(s, scope);
                }
                Ok(())
            }
            Statement::ForIn { source, body, .. } => {
                self.resolve_type(source, scope)?;
                for s in body {
                    let _ = self.check_statement(s, scope);
                }
                Ok(())
            }
            Statement::Case { discriminant, arms, else_branch, span } => {
                let disc_ty = self.resolve_type(discriminant, scope)?;
                for arm in arms {
                    match arm {
                        CaseArm::Values { values, body } => {
                            for v in values {
                                let arm_ty = self.resolve_type(v, scope)?;
                                let compatible = arm_ty == disc_ty
                                    || (disc_ty == Type::String && arm_ty == Type::Character);
                                if !compatible {
                                    let diag = Diagnostic::error(
                                        *span,
                                        format!(
                                            "case arm type {} does not match discriminant type {}",
                                            arm_ty.type_name(),
                                            disc_ty.type_name()
                                        ),
                                    );
                                    self.diagnostics.push(diag);
                                }
                            }
                            for s in body {
                                let _ = self.check_statement(s, scope);
                            }
                        }
                        CaseArm::Range { lo, hi, body } => {
                            self.resolve_type(lo, scope)?;
                            self.resolve_type(hi, scope)?;
                            for s in body {
                                let _ = self.check_statement(s, scope);
                            }
                        }
                    }
                }
                if let Some(branch) = else_branch {
                    for s in branch {
                        let _ = self.check_statement(s, scope);
                    }
                }
                Ok(())
            }
            Statement::Break { .. } => Ok(()),
            Statement::Block(block) => {
                scope.push();
                self.check_block(block, scope);
                scope.pop();
                Ok(())
            }
        }
    }

    fn require_boolean(&mut self, expr: &Expr, scope: &mut Scope, span: Option<Span>) -> Result<(), Diagnostic> {
        let ty = self.resolve_type(expr, scope)?;
        if ty != Type::Boolean {
            let diag = Diagnostic::error(span, format!("condition must be boolean, found {}", ty.type_name()));
            self.diagnostics.push(diag.clone());
            return Err(diag);
        }
        Ok(())
    }

    pub fn resolve_type(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Type, Diagnostic> {
        match expr {
            Expr::IntLiteral(_) => Ok(Type::Integer { width: 32 }),
            Expr::RealLiteral(_) => Ok(Type::Double),
            Expr::BoolLiteral(_) => Ok(Type::Boolean),
            Expr::CharLiteral(_) => Ok(Type::Character),
            Expr::StringLiteral(_) => Ok(Type::String),
            Expr::Nil => Ok(Type::Pointer { base: None }),
            Expr::Variable { name, deref, span } => {
                let ty = scope
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| Diagnostic::error(*span, format!("unknown variable '{name}'")))?;
                if *deref {
                    match ty {
                        Type::Pointer { base: Some(base) } => Ok(*base),
                        Type::Pointer { base: None } => Ok(Type::Unknown),
                        other => Ok(other),
                    }
                } else {
                    Ok(ty)
                }
            }
            Expr::FieldAccess { base, field, span } => {
                let base_ty = self.resolve_type(base, scope)?;
                base_ty
                    .field_type(field)
                    .cloned()
                    .ok_or_else(|| Diagnostic::error(*span, format!("unknown field '{field}'")))
            }
            Expr::ArrayAccess { base, index, span } => {
                self.resolve_type(index, scope)?;
                let base_ty = self.resolve_type(base, scope)?;
                match base_ty {
                    Type::FixedArray { element, .. } | Type::DynArray { element } => Ok(*element),
                    Type::String => Ok(Type::Character),
                    _ => Err(Diagnostic::error(*span, "indexed value is not an array or string")),
                }
            }
            Expr::AddressOf { base, .. } => {
                let ty = self.resolve_type(base, scope)?;
                Ok(Type::Pointer { base: Some(Box::new(ty)) })
            }
            Expr::UnaryMinus { operand, span } => {
                let ty = self.resolve_type(operand, scope)?;
                if !ty.is_numeric() {
                    return Err(Diagnostic::error(*span, "unary minus requires a numeric operand"));
                }
                Ok(ty)
            }
            Expr::Not { operand, span } => {
                let ty = self.resolve_type(operand, scope)?;
                if ty != Type::Boolean {
                    return Err(Diagnostic::error(*span, "'not' requires a boolean operand"));
                }
                Ok(Type::Boolean)
            }
            Expr::Binary { lhs, rhs, span, .. } => {
                let lhs_ty = self.resolve_type(lhs, scope)?;
                let rhs_ty = self.resolve_type(rhs, scope)?;
                if lhs_ty == Type::String && rhs_ty == Type::Character {
                    return Ok(Type::String);
                }
                if lhs_ty == rhs_ty && (lhs_ty.is_numeric() || lhs_ty == Type::String) {
                    return Ok(lhs_ty);
                }
                if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                    return Ok(widen_numeric(&lhs_ty, &rhs_ty));
                }
                Err(Diagnostic::error(
                    *span,
                    format!(
                        "binary operator requires matching numeric or string operands, found {} and {}",
                        lhs_ty.type_name(),
                        rhs_ty.type_name()
                    ),
                ))
            }
            Expr::Compare { lhs, rhs, span, .. } => {
                let lhs_ty = self.resolve_type(lhs, scope)?;
                let rhs_ty = self.resolve_type(rhs, scope)?;
                if lhs_ty == rhs_ty || (lhs_ty.is_numeric() && rhs_ty.is_numeric()) {
                    Ok(Type::Boolean)
                } else {
                    Err(Diagnostic::error(
                        *span,
                        format!("cannot compare {} with {}", lhs_ty.type_name(), rhs_ty.type_name()),
                    ))
                }
            }
            Expr::Logical { lhs, rhs, span, .. } => {
                let lhs_ty = self.resolve_type(lhs, scope)?;
                let rhs_ty = self.resolve_type(rhs, scope)?;
                if lhs_ty != Type::Boolean || rhs_ty != Type::Boolean {
                    return Err(Diagnostic::error(*span, "'and'/'or' require boolean operands"));
                }
                Ok(Type::Boolean)
            }
            Expr::Call { name, args, span } => self.resolve_call(name, args, scope, *span),
            Expr::TypeNode { type_name, span } => self
                .unit
                .types
                .lookup(type_name)
                .cloned()
                .ok_or_else(|| Diagnostic::error(*span, format!("unknown type '{type_name}'"))),
        }
    }

    fn resolve_call(&mut self, name: &str, args: &[Expr], scope: &mut Scope, span: Option<Span>) -> Result<Type, Diagnostic> {
        if SYSTEM_CALLS.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            for a in args {
                let _ = self.resolve_type(a, scope);
            }
            return Ok(system_call_return_type(name));
        }

        let mut arg_types = Vec::with_capacity(args.len());
        for a in args {
            arg_types.push(self.resolve_type(a, scope)?);
        }
        let signature = format!(
            "{}({})",
            name.to_lowercase(),
            arg_types.iter().map(|t| t.type_name()).collect::<Vec<_>>().join(",")
        );
        if let Some(function) = self.unit.function_by_signature(&signature) {
            return Ok(function.return_type.clone().unwrap_or(Type::Unknown));
        }
        if let Some(function) = self.unit.function_by_name(name) {
            if function.params.len() != args.len() {
                return Err(Diagnostic::error(
                    span,
                    format!(
                        "call to '{name}' passes {} argument(s), expected {}",
                        args.len(),
                        function.params.len()
                    ),
                ));
            }
            return Ok(function.return_type.clone().unwrap_or(Type::Unknown));
        }
        Err(Diagnostic::error(span, format!("unknown function '{name}'")))
    }
}

fn system_call_return_type(name: &str) -> Type {
    match name.to_lowercase().as_str() {
        "length" | "low" | "high" | "ord" => Type::Integer { width: 32 },
        "chr" => Type::Character,
        "pchar" => Type::Pointer { base: Some(Box::new(Type::Character)) },
        _ => Type::Unknown,
    }
}

fn widen_numeric(a: &Type, b: &Type) -> Type {
    match (a, b) {
        (Type::Double, _) | (_, Type::Double) => Type::Double,
        (Type::Single, _) | (_, Type::Single) => Type::Single,
        (Type::Integer { width: w1 }, Type::Integer { width: w2 }) => Type::Integer { width: *w1.max(w2) },
        _ => a.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::{NullResolver, Parser};
    use crate::source_map::SourceMap;

    fn check(src: &str) -> DiagnosticList {
        let mut sm = SourceMap::new();
        let file = sm.add_file("test.pas", src);
        let (tokens, _) = lex(file, src);
        let mut resolver = NullResolver;
        let mut parser = Parser::new(tokens, &mut resolver);
        let unit = parser.parse_file().unwrap_or_else(|d| panic!("{}", d.message));
        let mut checker = TypeChecker::new(&unit);
        checker.check();
        checker.diagnostics
    }

    #[test]
    fn accepts_well_typed_for_loop() {
        let diags = check(
            "program s; var i,total:integer; begin total:=0; for i:=1 to 10 do total:=total+i; end.",
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn rejects_assigning_integer_to_boolean() {
        let diags = check("program p; var b:boolean; begin b:=1; end.");
        assert!(diags.has_fatal());
    }

    #[test]
    fn rejects_non_boolean_if_condition() {
        let diags = check("program p; var i:integer; begin i:=1; if i then i:=2; end.");
        assert!(diags.has_fatal());
    }

    #[test]
    fn accepts_string_char_concatenation() {
        let diags = check("program p; var s:string; begin s:='a'; s:=s+'b'; end.");
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn rejects_unknown_variable() {
        let diags = check("program p; begin x:=1; end.");
        assert!(diags.has_fatal());
    }
}
