//! IR generator state (C8)
//!
//! `CodeGen` owns the emitted module text and per-compilation bookkeeping.
//! A function's symbol table is a stack of scopes pushed on block entry and
//! popped on exit, living only while that function is being lowered, rather
//! than a single flat map shared across the whole module.

use crate::ast::FunctionDef;
use crate::types::{Type, TypeRegistry};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct NamedAlloc {
    /// The IR register holding this variable's address (an `alloca` result
    /// or an incoming pointer parameter).
    pub ptr: String,
    pub ty: Type,
}

pub struct CurrentFn {
    pub name: String,
    pub return_type: Option<Type>,
    pub explicit_return: bool,
    scopes: Vec<HashMap<String, NamedAlloc>>,
    pub break_targets: Vec<String>,
}

impl CurrentFn {
    fn new(name: String, return_type: Option<Type>) -> Self {
        CurrentFn {
            name,
            return_type,
            explicit_return: false,
            scopes: vec![HashMap::new()],
            break_targets: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: &str, alloc: NamedAlloc) {
        self.scopes.last_mut().unwrap().insert(name.to_lowercase(), alloc);
    }

    pub fn lookup(&self, name: &str) -> Option<&NamedAlloc> {
        let key = name.to_lowercase();
        self.scopes.iter().rev().find_map(|s| s.get(&key))
    }
}

pub struct CodeGen<'t> {
    pub output: String,
    pub string_globals: String,
    temp_counter: u32,
    block_counter: u32,
    string_counter: u32,
    pub type_registry: &'t TypeRegistry,
    pub functions: HashMap<String, FunctionDef>,
    pub current: Option<CurrentFn>,
}

impl<'t> CodeGen<'t> {
    pub fn new(type_registry: &'t TypeRegistry) -> Self {
        CodeGen {
            output: String::new(),
            string_globals: String::new(),
            temp_counter: 0,
            block_counter: 0,
            string_counter: 0,
            type_registry,
            functions: HashMap::new(),
            current: None,
        }
    }

    pub fn new_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("%t{}", self.temp_counter)
    }

    pub fn new_label(&mut self, prefix: &str) -> String {
        self.block_counter += 1;
        format!("{prefix}{}", self.block_counter)
    }

    pub fn new_string_global(&mut self) -> String {
        self.string_counter += 1;
        format!("@.str.{}", self.string_counter)
    }

    pub fn enter_function(&mut self, name: &str, return_type: Option<Type>) {
        self.current = Some(CurrentFn::new(name.to_string(), return_type));
    }

    pub fn leave_function(&mut self) {
        self.current = None;
    }

    pub fn current_mut(&mut self) -> &mut CurrentFn {
        self.current.as_mut().expect("codegen: no function being lowered")
    }

    pub fn current_ref(&self) -> &CurrentFn {
        self.current.as_ref().expect("codegen: no function being lowered")
    }
}
