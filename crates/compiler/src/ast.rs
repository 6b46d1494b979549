//! AST (C5)
//!
//! A pure data sum type: no per-node virtual `resolveType`/`typecheck`/
//! `codegen` methods live here. Those are `match` functions in
//! `typechecker.rs` and `codegen/` over these sum types instead.

use crate::source_map::Span;
use crate::types::{Type, TypeRegistry};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    IntDiv,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral(i64),
    RealLiteral(f64),
    BoolLiteral(bool),
    CharLiteral(char),
    StringLiteral(String),
    Nil,
    /// Variable access. `deref` is true for the `^` suffix.
    Variable { name: String, deref: bool, span: Option<Span> },
    FieldAccess { base: Box<Expr>, field: String, span: Option<Span> },
    ArrayAccess { base: Box<Expr>, index: Box<Expr>, span: Option<Span> },
    AddressOf { base: Box<Expr>, span: Option<Span> },
    UnaryMinus { operand: Box<Expr>, span: Option<Span> },
    Not { operand: Box<Expr>, span: Option<Span> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Option<Span> },
    Compare { op: CompareOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Option<Span> },
    Logical { op: LogicalOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Option<Span> },
    Call { name: String, args: Vec<Expr>, span: Option<Span> },
    /// A type reference appearing where an expression is grammatically
    /// expected (case-arm type ranges, `new(T)` style pointee types).
    TypeNode { type_name: String, span: Option<Span> },
}

impl Expr {
    pub fn span(&self) -> Option<Span> {
        match self {
            Expr::Variable { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::ArrayAccess { span, .. }
            | Expr::AddressOf { span, .. }
            | Expr::UnaryMinus { span, .. }
            | Expr::Not { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Compare { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Call { span, .. }
            | Expr::TypeNode { span, .. } => *span,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaseArm {
    Values { values: Vec<Expr>, body: Vec<Statement> },
    Range { lo: Expr, hi: Expr, body: Vec<Statement> },
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assign { target: Expr, value: Expr, span: Option<Span> },
    Call { call: Expr, span: Option<Span> },
    If { cond: Expr, then_branch: Vec<Statement>, else_branch: Option<Vec<Statement>>, span: Option<Span> },
    While { cond: Expr, body: Vec<Statement>, span: Option<Span> },
    Repeat { body: Vec<Statement>, cond: Expr, span: Option<Span> },
    For { var: String, start: Expr, end: Expr, downto: bool, body: Vec<Statement>, span: Option<Span> },
    ForIn { var: String, source: Expr, body: Vec<Statement>, span: Option<Span> },
    Case { discriminant: Expr, arms: Vec<CaseArm>, else_branch: Option<Vec<Statement>>, span: Option<Span> },
    Break { span: Option<Span> },
    Block(Block),
}

#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    pub ty: Type,
    pub is_constant: bool,
    pub is_by_reference: bool,
    pub alias: Option<String>,
    pub initializer: Option<Expr>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub vars: Vec<VariableDef>,
    pub consts: Vec<VariableDef>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub by_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionAttribute {
    Inline,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub external_name: Option<String>,
    pub lib_name: Option<String>,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Option<Block>,
    pub attributes: Vec<FunctionAttribute>,
}

impl FunctionDef {
    /// `name(type1,type2,...)`, the overload-resolution key (spec's
    /// case-insensitive-by-name, strict-by-arity keying).
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.type_name()).collect();
        format!("{}({})", self.name.to_lowercase(), params.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Program,
    Library,
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub kind: UnitKind,
    pub name: String,
    pub uses: Vec<String>,
    pub interface_types: TypeRegistry,
    pub types: TypeRegistry,
    pub functions: Vec<FunctionDef>,
    pub main_block: Option<Block>,
}

impl Unit {
    pub fn new(kind: UnitKind, name: String) -> Self {
        Unit {
            kind,
            name,
            uses: Vec::new(),
            interface_types: TypeRegistry::new(),
            types: TypeRegistry::new(),
            functions: Vec::new(),
            main_block: None,
        }
    }

    pub fn function_by_signature(&self, sig: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.signature() == sig)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Merge importable symbols from `other` into `self`'s tables,
    /// without overwriting any entry already present.
    pub fn merge_imported(&mut self, other: &Unit) {
        self.types.merge_without_overwrite(&other.types);
        let mut by_sig: HashMap<String, ()> = HashMap::new();
        for f in &self.functions {
            by_sig.insert(f.signature(), ());
        }
        for f in &other.functions {
            if !by_sig.contains_key(&f.signature()) {
                self.functions.push(f.clone());
            }
        }
    }
}
