//! Parser (C6)
//!
//! Table-free recursive descent with the helper vocabulary the grammar is
//! described in terms of: `current`, `peek`, `can_consume`, `try_consume`,
//! `consume`, `consume_keyword`, `try_consume_keyword`. Expression parsing
//! is the two-level shape: `parse_base_expression` handles `* / div mod`
//! and `+ -` (plus comparisons when asked), `parse_expression` wraps it
//! with `and`/`or`/`not`.
//!
//! Unit (`uses`) resolution is injected through the [`UnitResolver`] trait
//! so this module stays testable in isolation; `resolver.rs` supplies the
//! real implementation backed by the filesystem and a unit cache.

use crate::ast::*;
use crate::diagnostics::Diagnostic;
use crate::lexer::{Token, TokenKind};
use crate::types::Type;

/// Resolves a `uses`d unit by bare name, returning its parsed AST (already
/// lexed, macro-expanded, parsed and typechecked-to-the-extent-possible).
/// Fatal parser errors bubble as `Err`.
pub trait UnitResolver {
    fn resolve(&mut self, name: &str) -> Result<Unit, Diagnostic>;
}

/// A resolver that rejects every `uses` clause; useful for parser unit
/// tests that don't exercise cross-unit resolution.
pub struct NullResolver;

impl UnitResolver for NullResolver {
    fn resolve(&mut self, name: &str) -> Result<Unit, Diagnostic> {
        Err(Diagnostic::error(
            None,
            format!("no resolver configured to import unit '{name}'"),
        ))
    }
}

pub struct Parser<'r> {
    tokens: Vec<Token>,
    pos: usize,
    resolver: &'r mut dyn UnitResolver,
}

type PResult<T> = Result<T, Diagnostic>;

impl<'r> Parser<'r> {
    pub fn new(tokens: Vec<Token>, resolver: &'r mut dyn UnitResolver) -> Self {
        Parser { tokens, pos: 0, resolver }
    }

    // --- helper vocabulary ---

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self, lookahead: usize) -> &Token {
        self.tokens
            .get(self.pos + lookahead)
            .unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn can_consume(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn can_consume_keyword(&self, word: &str) -> bool {
        self.current().is_keyword(word)
    }

    fn try_consume(&mut self, kind: TokenKind) -> Option<Token> {
        if self.can_consume(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn try_consume_keyword(&mut self, word: &str) -> Option<Token> {
        if self.can_consume_keyword(word) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn consume(&mut self, kind: TokenKind) -> PResult<Token> {
        self.try_consume(kind)
            .ok_or_else(|| self.error(format!("expected {:?}, found '{}'", kind, self.current().text)))
    }

    fn consume_keyword(&mut self, word: &str) -> PResult<Token> {
        self.try_consume_keyword(word)
            .ok_or_else(|| self.error(format!("expected keyword '{word}', found '{}'", self.current().text)))
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(Some(self.current().span), message)
    }

    fn consume_ident(&mut self) -> PResult<String> {
        let tok = self.consume(TokenKind::Ident)?;
        Ok(tok.text)
    }

    // --- file ---

    pub fn parse_file(&mut self) -> PResult<Unit> {
        if self.can_consume_keyword("program") {
            self.parse_program()
        } else if self.can_consume_keyword("unit") {
            self.parse_unit()
        } else {
            Err(self.error("expected 'program' or 'unit'"))
        }
    }

    fn import_uses(&mut self, unit: &mut Unit, names: &[String]) -> PResult<()> {
        for name in names {
            let imported = self.resolver.resolve(name)?;
            unit.merge_imported(&imported);
            unit.uses.push(name.clone());
        }

        // Every program implicitly imports the RTL's `system` unit unless
        // it *is* the system unit. This import is best-effort: a program
        // compiled without an RTL directory on its search path (as in
        // isolated tests) still compiles, it just doesn't get anything
        // `system.pas` would have exported.
        let needs_system = unit.kind == UnitKind::Program
            && !unit.name.eq_ignore_ascii_case("system")
            && !names.iter().any(|n| n.eq_ignore_ascii_case("system"));
        if needs_system
            && let Ok(imported) = self.resolver.resolve("system") {
                unit.merge_imported(&imported);
                unit.uses.push("system".to_string());
            }
        Ok(())
    }

    fn parse_program(&mut self) -> PResult<Unit> {
        self.consume_keyword("program")?;
        let name = self.consume_ident()?;
        if self.try_consume(TokenKind::LParen).is_some() {
            self.consume(TokenKind::Ident)?;
            while self.try_consume(TokenKind::Comma).is_some() {
                self.consume(TokenKind::Ident)?;
            }
            self.consume(TokenKind::RParen)?;
        }
        self.consume(TokenKind::Semicolon)?;

        let mut unit = Unit::new(UnitKind::Program, name);
        let mut uses_names = Vec::new();
        let mut global_vars = Vec::new();
        let mut global_consts = Vec::new();

        loop {
            if self.can_consume_keyword("uses") {
                uses_names.extend(self.parse_uses()?);
            } else if self.can_consume_keyword("type") {
                self.parse_type_section(&mut unit.types)?;
            } else if self.can_consume_keyword("const") {
                global_consts.extend(self.parse_const_section(&unit.types)?);
            } else if self.can_consume_keyword("var") {
                global_vars.extend(self.parse_var_section(&unit.types)?);
            } else if self.can_consume_keyword("procedure") || self.can_consume_keyword("function") {
                unit.functions.push(self.parse_subprogram(&unit.types)?);
            } else {
                break;
            }
        }

        self.import_uses(&mut unit, &uses_names)?;

        let mut block = self.parse_begin_end_block(&unit.types)?;
        block.vars.splice(0..0, global_vars);
        block.consts.splice(0..0, global_consts);
        self.consume(TokenKind::Dot)?;
        unit.main_block = Some(block);
        Ok(unit)
    }

    fn parse_unit(&mut self) -> PResult<Unit> {
        self.consume_keyword("unit")?;
        let name = self.consume_ident()?;
        self.consume(TokenKind::Semicolon)?;
        self.consume_keyword("interface")?;

        let mut unit = Unit::new(UnitKind::Library, name);
        let mut uses_names = Vec::new();

        loop {
            if self.can_consume_keyword("uses") {
                uses_names.extend(self.parse_uses()?);
            } else if self.can_consume_keyword("type") {
                self.parse_type_section(&mut unit.interface_types)?;
            } else if self.can_consume_keyword("const") {
                self.parse_const_section(&unit.interface_types)?;
            } else if self.can_consume_keyword("var") {
                self.parse_var_section(&unit.interface_types)?;
            } else if self.can_consume_keyword("procedure") || self.can_consume_keyword("function") {
                // interface section: signature only, terminated by ';'
                self.parse_subprogram_signature(&unit.interface_types)?;
            } else {
                break;
            }
        }

        unit.types.merge_without_overwrite(&unit.interface_types);
        self.import_uses(&mut unit, &uses_names)?;
        self.consume_keyword("implementation")?;

        loop {
            if self.can_consume_keyword("type") {
                self.parse_type_section(&mut unit.types)?;
            } else if self.can_consume_keyword("const") {
                self.parse_const_section(&unit.types)?;
            } else if self.can_consume_keyword("var") {
                self.parse_var_section(&unit.types)?;
            } else if self.can_consume_keyword("procedure") || self.can_consume_keyword("function") {
                unit.functions.push(self.parse_subprogram(&unit.types)?);
            } else {
                break;
            }
        }

        if self.try_consume_keyword("initialization").is_some() {
            unit.main_block = Some(self.parse_statements_until_end(&unit.types)?);
        }
        self.consume_keyword("end")?;
        self.consume(TokenKind::Dot)?;
        Ok(unit)
    }

    fn parse_uses(&mut self) -> PResult<Vec<String>> {
        self.consume_keyword("uses")?;
        let mut names = vec![self.consume_ident()?];
        while self.try_consume(TokenKind::Comma).is_some() {
            names.push(self.consume_ident()?);
        }
        self.consume(TokenKind::Semicolon)?;
        Ok(names)
    }

    // --- declarations ---

    fn parse_type_section(&mut self, types: &mut crate::types::TypeRegistry) -> PResult<()> {
        self.consume_keyword("type")?;
        while self.can_consume(TokenKind::Ident)
            && self.peek(1).kind == TokenKind::Eq
        {
            let name = self.consume_ident()?;
            self.consume(TokenKind::Eq)?;
            let ty = self.parse_type(types)?;
            self.consume(TokenKind::Semicolon)?;
            types.register(&name, ty);
        }
        Ok(())
    }

    fn parse_const_section(&mut self, types: &crate::types::TypeRegistry) -> PResult<Vec<VariableDef>> {
        self.consume_keyword("const")?;
        let mut out = Vec::new();
        while self.can_consume(TokenKind::Ident) {
            let name_tok = self.advance();
            let declared_ty = if self.try_consume(TokenKind::Colon).is_some() {
                Some(self.parse_type(types)?)
            } else {
                None
            };
            self.consume(TokenKind::Eq)?;
            let value = self.parse_expression()?;
            self.consume(TokenKind::Semicolon)?;
            let ty = declared_ty.unwrap_or_else(|| infer_literal_type(&value));
            out.push(VariableDef {
                name: name_tok.text,
                ty,
                is_constant: true,
                is_by_reference: false,
                alias: None,
                initializer: Some(value),
                span: Some(name_tok.span),
            });
        }
        Ok(out)
    }

    fn parse_var_section(&mut self, types: &crate::types::TypeRegistry) -> PResult<Vec<VariableDef>> {
        self.consume_keyword("var")?;
        let mut out = Vec::new();
        while self.can_consume(TokenKind::Ident) {
            out.extend(self.parse_var_group(types, false)?);
        }
        Ok(out)
    }

    /// `ident {"," ident} ":" type [ "=" init-expr ] ";"`
    fn parse_var_group(
        &mut self,
        types: &crate::types::TypeRegistry,
        by_reference: bool,
    ) -> PResult<Vec<VariableDef>> {
        let mut names = vec![self.consume_ident()?];
        let mut spans = vec![self.tokens[self.pos - 1].span];
        while self.try_consume(TokenKind::Comma).is_some() {
            names.push(self.consume_ident()?);
            spans.push(self.tokens[self.pos - 1].span);
        }
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type(types)?;
        let initializer = if self.try_consume(TokenKind::Eq).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon)?;
        Ok(names
            .into_iter()
            .zip(spans)
            .map(|(name, span)| VariableDef {
                name,
                ty: ty.clone(),
                is_constant: false,
                is_by_reference: by_reference,
                alias: None,
                initializer: initializer.clone(),
                span: Some(span),
            })
            .collect())
    }

    fn parse_subprogram_signature(&mut self, types: &crate::types::TypeRegistry) -> PResult<FunctionDef> {
        let is_function = self.can_consume_keyword("function");
        self.advance(); // procedure | function
        let name = self.consume_ident()?;
        let params = self.parse_params(types)?;
        let return_type = if is_function {
            self.consume(TokenKind::Colon)?;
            Some(self.parse_type(types)?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon)?;
        Ok(FunctionDef {
            name,
            external_name: None,
            lib_name: None,
            params,
            return_type,
            body: None,
            attributes: Vec::new(),
        })
    }

    fn parse_subprogram(&mut self, types: &crate::types::TypeRegistry) -> PResult<FunctionDef> {
        let mut def = self.parse_subprogram_signature(types)?;
        if self.try_consume_keyword("external").is_some() {
            if self.can_consume(TokenKind::StringLiteral) {
                def.lib_name = Some(self.advance().text);
            }
            if self.try_consume_keyword("name").is_some() {
                def.external_name = Some(self.consume(TokenKind::StringLiteral)?.text);
            }
            self.consume(TokenKind::Semicolon)?;
        } else if self.try_consume_keyword("inline").is_some() {
            self.consume(TokenKind::Semicolon)?;
            def.attributes.push(FunctionAttribute::Inline);
        } else {
            let mut block = self.parse_block(types)?;
            if def.return_type.is_some() {
                block.vars.push(VariableDef {
                    name: "result".to_string(),
                    ty: def.return_type.clone().unwrap(),
                    is_constant: false,
                    is_by_reference: false,
                    alias: Some(def.name.clone()),
                    initializer: None,
                    span: None,
                });
            }
            self.consume(TokenKind::Semicolon)?;
            def.body = Some(block);
        }
        Ok(def)
    }

    fn parse_params(&mut self, types: &crate::types::TypeRegistry) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.try_consume(TokenKind::LParen).is_some() {
            if !self.can_consume(TokenKind::RParen) {
                params.extend(self.parse_param_group(types)?);
                while self.try_consume(TokenKind::Semicolon).is_some() {
                    params.extend(self.parse_param_group(types)?);
                }
            }
            self.consume(TokenKind::RParen)?;
        }
        Ok(params)
    }

    fn parse_param_group(&mut self, types: &crate::types::TypeRegistry) -> PResult<Vec<Param>> {
        let by_reference = self.try_consume_keyword("var").is_some();
        let mut names = vec![self.consume_ident()?];
        while self.try_consume(TokenKind::Comma).is_some() {
            names.push(self.consume_ident()?);
        }
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type(types)?;
        Ok(names
            .into_iter()
            .map(|name| Param { name, ty: ty.clone(), by_reference })
            .collect())
    }

    // --- types ---

    fn parse_type(&mut self, types: &crate::types::TypeRegistry) -> PResult<Type> {
        if self.try_consume(TokenKind::Caret).is_some() {
            let base = self.parse_type(types)?;
            return Ok(Type::Pointer { base: Some(Box::new(base)) });
        }
        if self.can_consume_keyword("array") {
            return self.parse_array_type(types);
        }
        if self.can_consume_keyword("record") {
            return self.parse_record_type(types);
        }
        if self.can_consume_keyword("file") {
            self.advance();
            if self.try_consume_keyword("of").is_some() {
                let elem = self.parse_type(types)?;
                return Ok(Type::File { element: Some(Box::new(elem)) });
            }
            return Ok(Type::File { element: None });
        }
        if self.can_consume(TokenKind::LParen) {
            return self.parse_enum_or_range_type();
        }
        let name = self.consume_ident()?;
        match types.lookup(&name) {
            Some(ty) => Ok(ty.clone()),
            None => Err(self.error(format!("unknown type '{name}'"))),
        }
    }

    fn parse_array_type(&mut self, types: &crate::types::TypeRegistry) -> PResult<Type> {
        self.consume_keyword("array")?;
        if self.try_consume(TokenKind::LBracket).is_some() {
            let lo_expr = self.parse_expression()?;
            self.consume(TokenKind::DotDot)?;
            let hi_expr = self.parse_expression()?;
            self.consume(TokenKind::RBracket)?;
            self.consume_keyword("of")?;
            let element = self.parse_type(types)?;
            let lo = const_eval_int(&lo_expr).map_err(|_| self.error("array bound must be a compile-time constant"))?;
            let hi = const_eval_int(&hi_expr).map_err(|_| self.error("array bound must be a compile-time constant"))?;
            if lo > hi {
                return Err(self.error("array lower bound must not exceed upper bound"));
            }
            Ok(Type::FixedArray { lo, hi, element: Box::new(element) })
        } else {
            self.consume_keyword("of")?;
            let element = self.parse_type(types)?;
            Ok(Type::DynArray { element: Box::new(element) })
        }
    }

    fn parse_record_type(&mut self, types: &crate::types::TypeRegistry) -> PResult<Type> {
        self.consume_keyword("record")?;
        let mut fields = Vec::new();
        while !self.can_consume_keyword("end") {
            let mut names = vec![self.consume_ident()?];
            while self.try_consume(TokenKind::Comma).is_some() {
                names.push(self.consume_ident()?);
            }
            self.consume(TokenKind::Colon)?;
            let ty = self.parse_type(types)?;
            self.consume(TokenKind::Semicolon)?;
            for name in names {
                fields.push((name, ty.clone()));
            }
        }
        self.consume_keyword("end")?;
        Ok(Type::Record { fields })
    }

    /// Disambiguates `(A, B, C)` enum literals from `(lo..hi)` range
    /// literals by scanning ahead for a `..` at the current paren depth.
    fn parse_enum_or_range_type(&mut self) -> PResult<Type> {
        self.consume(TokenKind::LParen)?;
        let is_range = {
            let mut depth = 0usize;
            let mut i = self.pos;
            let mut found = false;
            loop {
                match self.tokens[i].kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    TokenKind::DotDot if depth == 0 => {
                        found = true;
                        break;
                    }
                    TokenKind::Eof => break,
                    _ => {}
                }
                i += 1;
            }
            found
        };

        if is_range {
            let lo_expr = self.parse_expression()?;
            self.consume(TokenKind::DotDot)?;
            let hi_expr = self.parse_expression()?;
            self.consume(TokenKind::RParen)?;
            let lo = const_eval_int(&lo_expr).map_err(|_| self.error("range bound must be a compile-time constant"))?;
            let hi = const_eval_int(&hi_expr).map_err(|_| self.error("range bound must be a compile-time constant"))?;
            Ok(Type::ValueRange { lo, hi })
        } else {
            let mut variants = Vec::new();
            let mut next_value = 0i64;
            loop {
                let name = self.consume_ident()?;
                let value = if self.try_consume(TokenKind::Eq).is_some() {
                    let tok = self.consume(TokenKind::IntNumber)?;
                    tok.text.parse::<i64>().map_err(|_| self.error("invalid enum value"))?
                } else {
                    next_value
                };
                next_value = value + 1;
                variants.push((name, value));
                if self.try_consume(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.consume(TokenKind::RParen)?;
            Ok(Type::Enum { variants })
        }
    }

    // --- blocks & statements ---

    fn parse_block(&mut self, types: &crate::types::TypeRegistry) -> PResult<Block> {
        let mut vars = Vec::new();
        let mut consts = Vec::new();
        loop {
            if self.can_consume_keyword("var") {
                self.advance();
                while self.can_consume(TokenKind::Ident) {
                    vars.extend(self.parse_var_group(types, false)?);
                }
            } else if self.can_consume_keyword("const") {
                self.advance();
                while self.can_consume(TokenKind::Ident) {
                    let name_tok = self.advance();
                    self.consume(TokenKind::Eq)?;
                    let value = self.parse_expression()?;
                    self.consume(TokenKind::Semicolon)?;
                    let ty = infer_literal_type(&value);
                    consts.push(VariableDef {
                        name: name_tok.text,
                        ty,
                        is_constant: true,
                        is_by_reference: false,
                        alias: None,
                        initializer: Some(value),
                        span: Some(name_tok.span),
                    });
                }
            } else {
                break;
            }
        }
        let mut block = self.parse_begin_end_block(types)?;
        block.vars.splice(0..0, vars);
        block.consts.splice(0..0, consts);
        Ok(block)
    }

    fn parse_begin_end_block(&mut self, types: &crate::types::TypeRegistry) -> PResult<Block> {
        self.consume_keyword("begin")?;
        let block = self.parse_statements_until_end(types)?;
        Ok(block)
    }

    fn parse_statements_until_end(&mut self, types: &crate::types::TypeRegistry) -> PResult<Block> {
        let mut statements = Vec::new();
        while !self.can_consume_keyword("end") {
            statements.push(self.parse_statement(types)?);
            self.try_consume(TokenKind::Semicolon);
        }
        self.consume_keyword("end")?;
        Ok(Block { vars: Vec::new(), consts: Vec::new(), statements })
    }

    fn parse_statement(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        if self.can_consume_keyword("begin") {
            return Ok(Statement::Block(self.parse_begin_end_block(types)?));
        }
        if self.can_consume_keyword("if") {
            return self.parse_if(types);
        }
        if self.can_consume_keyword("while") {
            return self.parse_while(types);
        }
        if self.can_consume_keyword("repeat") {
            return self.parse_repeat(types);
        }
        if self.can_consume_keyword("for") {
            return self.parse_for(types);
        }
        if self.can_consume_keyword("case") {
            return self.parse_case(types);
        }
        if self.can_consume_keyword("break") {
            self.advance();
            return Ok(Statement::Break { span: Some(span) });
        }
        // assignment or call
        let expr = self.parse_postfix()?;
        if self.try_consume(TokenKind::ColonEq).is_some() {
            let value = self.parse_expression()?;
            Ok(Statement::Assign { target: expr, value, span: Some(span) })
        } else {
            Ok(Statement::Call { call: expr, span: Some(span) })
        }
    }

    fn parse_if(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        self.consume_keyword("if")?;
        let cond = self.parse_expression()?;
        self.consume_keyword("then")?;
        let then_branch = vec![self.parse_statement(types)?];
        let else_branch = if self.try_consume_keyword("else").is_some() {
            Some(vec![self.parse_statement(types)?])
        } else {
            None
        };
        Ok(Statement::If { cond, then_branch, else_branch, span: Some(span) })
    }

    fn parse_while(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        self.consume_keyword("while")?;
        let cond = self.parse_expression()?;
        self.consume_keyword("do")?;
        let body = vec![self.parse_statement(types)?];
        Ok(Statement::While { cond, body, span: Some(span) })
    }

    fn parse_repeat(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        self.consume_keyword("repeat")?;
        let mut body = Vec::new();
        while !self.can_consume_keyword("until") {
            body.push(self.parse_statement(types)?);
            self.try_consume(TokenKind::Semicolon);
        }
        self.consume_keyword("until")?;
        let cond = self.parse_expression()?;
        Ok(Statement::Repeat { body, cond, span: Some(span) })
    }

    fn parse_for(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        self.consume_keyword("for")?;
        let var = self.consume_ident()?;
        if self.try_consume_keyword("in").is_some() {
            let source = self.parse_expression()?;
            self.consume_keyword("do")?;
            let body = vec![self.parse_statement(types)?];
            return Ok(Statement::ForIn { var, source, body, span: Some(span) });
        }
        self.consume(TokenKind::ColonEq)?;
        let start = self.parse_expression()?;
        let downto = if self.try_consume_keyword("to").is_some() {
            false
        } else {
            self.consume_keyword("downto")?;
            true
        };
        let end = self.parse_expression()?;
        self.consume_keyword("do")?;
        let body = vec![self.parse_statement(types)?];
        Ok(Statement::For { var, start, end, downto, body, span: Some(span) })
    }

    fn parse_case(&mut self, types: &crate::types::TypeRegistry) -> PResult<Statement> {
        let span = self.current().span;
        self.consume_keyword("case")?;
        let discriminant = self.parse_expression()?;
        self.consume_keyword("of")?;
        let mut arms = Vec::new();
        let mut else_branch = None;
        while !self.can_consume_keyword("end") {
            if self.try_consume_keyword("else").is_some() {
                let mut stmts = Vec::new();
                while !self.can_consume_keyword("end") {
                    stmts.push(self.parse_statement(types)?);
                    self.try_consume(TokenKind::Semicolon);
                }
                else_branch = Some(stmts);
                break;
            }
            let first = self.parse_expression()?;
            if self.try_consume(TokenKind::DotDot).is_some() {
                let hi = self.parse_expression()?;
                self.consume(TokenKind::Colon)?;
                let body = vec![self.parse_statement(types)?];
                self.try_consume(TokenKind::Semicolon);
                arms.push(CaseArm::Range { lo: first, hi, body });
            } else {
                let mut values = vec![first];
                while self.try_consume(TokenKind::Comma).is_some() {
                    values.push(self.parse_expression()?);
                }
                self.consume(TokenKind::Colon)?;
                let body = vec![self.parse_statement(types)?];
                self.try_consume(TokenKind::Semicolon);
                arms.push(CaseArm::Values { values, body });
            }
        }
        self.consume_keyword("end")?;
        Ok(Statement::Case { discriminant, arms, else_branch, span: Some(span) })
    }

    // --- expressions ---

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.can_consume_keyword("or") {
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical { op: LogicalOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Some(span) };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.can_consume_keyword("and") {
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Some(span) };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.can_consume_keyword("not") {
            let span = self.current().span;
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Not { operand: Box::new(operand), span: Some(span) });
        }
        self.parse_base_expression(true)
    }

    /// `* / div mod + -`, plus comparisons when `include_compare` is set.
    fn parse_base_expression(&mut self, include_compare: bool) -> PResult<Expr> {
        let lhs = self.parse_additive()?;
        if include_compare
            && let Some(op) = self.peek_compare_op() {
                let span = self.current().span;
                self.advance();
                if op == TokenKind::Gt && self.can_consume(TokenKind::Eq) {
                    // handled by lexer as GtEq already; unreachable branch kept defensive
                }
                let rhs = self.parse_additive()?;
                let compare_op = match op {
                    TokenKind::Eq => CompareOp::Eq,
                    TokenKind::NotEq => CompareOp::NotEq,
                    TokenKind::Lt => CompareOp::Lt,
                    TokenKind::LtEq => CompareOp::LtEq,
                    TokenKind::Gt => CompareOp::Gt,
                    TokenKind::GtEq => CompareOp::GtEq,
                    _ => unreachable!(),
                };
                return Ok(Expr::Compare { op: compare_op, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Some(span) });
            }
        Ok(lhs)
    }

    fn peek_compare_op(&self) -> Option<TokenKind> {
        match self.current().kind {
            TokenKind::Eq | TokenKind::NotEq | TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => {
                Some(self.current().kind)
            }
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.can_consume(TokenKind::Plus) {
                BinOp::Add
            } else if self.can_consume(TokenKind::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Some(span) };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.can_consume(TokenKind::Star) {
                BinOp::Mul
            } else if self.can_consume(TokenKind::Slash) {
                BinOp::Div
            } else if self.can_consume_keyword("div") {
                BinOp::IntDiv
            } else if self.can_consume_keyword("mod") {
                BinOp::Mod
            } else {
                break;
            };
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Some(span) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.can_consume(TokenKind::Minus) {
            let span = self.current().span;
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryMinus { operand: Box::new(operand), span: Some(span) });
        }
        if self.can_consume(TokenKind::At) {
            let span = self.current().span;
            self.advance();
            let base = self.parse_unary()?;
            return Ok(Expr::AddressOf { base: Box::new(base), span: Some(span) });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.try_consume(TokenKind::Caret).is_some() {
                expr = match expr {
                    Expr::Variable { name, span, .. } => Expr::Variable { name, deref: true, span },
                    other => other,
                };
            } else if self.try_consume(TokenKind::Dot).is_some() {
                let span = self.current().span;
                let field = self.consume_ident()?;
                expr = Expr::FieldAccess { base: Box::new(expr), field, span: Some(span) };
            } else if self.try_consume(TokenKind::LBracket).is_some() {
                let span = self.current().span;
                let index = self.parse_expression()?;
                self.consume(TokenKind::RBracket)?;
                expr = Expr::ArrayAccess { base: Box::new(expr), index: Box::new(index), span: Some(span) };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntNumber => {
                self.advance();
                let value = tok.text.parse::<i64>().map_err(|_| self.error("invalid integer literal"))?;
                Ok(Expr::IntLiteral(value))
            }
            TokenKind::RealNumber => {
                self.advance();
                let value = tok.text.parse::<f64>().map_err(|_| self.error("invalid real literal"))?;
                Ok(Expr::RealLiteral(value))
            }
            TokenKind::StringLiteral | TokenKind::EscapedString => {
                self.advance();
                Ok(Expr::StringLiteral(tok.text))
            }
            TokenKind::CharLiteral => {
                self.advance();
                Ok(Expr::CharLiteral(tok.text.chars().next().unwrap_or('\0')))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Keyword if tok.text.eq_ignore_ascii_case("true") => {
                self.advance();
                Ok(Expr::BoolLiteral(true))
            }
            TokenKind::Keyword if tok.text.eq_ignore_ascii_case("false") => {
                self.advance();
                Ok(Expr::BoolLiteral(false))
            }
            TokenKind::Keyword if tok.text.eq_ignore_ascii_case("nil") => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Ident => {
                self.advance();
                if self.try_consume(TokenKind::LParen).is_some() {
                    let mut args = Vec::new();
                    if !self.can_consume(TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        while self.try_consume(TokenKind::Comma).is_some() {
                            args.push(self.parse_expression()?);
                        }
                    }
                    self.consume(TokenKind::RParen)?;
                    Ok(Expr::Call { name: tok.text, args, span: Some(tok.span) })
                } else {
                    Ok(Expr::Variable { name: tok.text, deref: false, span: Some(tok.span) })
                }
            }
            _ => Err(self.error(format!("unexpected token '{}'", tok.text))),
        }
    }
}

fn infer_literal_type(expr: &Expr) -> Type {
    match expr {
        Expr::IntLiteral(_) => Type::Integer { width: 32 },
        Expr::RealLiteral(_) => Type::Double,
        Expr::BoolLiteral(_) => Type::Boolean,
        Expr::CharLiteral(_) => Type::Character,
        Expr::StringLiteral(_) => Type::String,
        _ => Type::Unknown,
    }
}

/// Evaluates a compile-time-constant integer expression (array/range
/// bounds). Supports literals, unary minus, and +/- combinations thereof.
fn const_eval_int(expr: &Expr) -> Result<i64, ()> {
    match expr {
        Expr::IntLiteral(v) => Ok(*v),
        Expr::UnaryMinus { operand, .. } => Ok(-const_eval_int(operand)?),
        Expr::Binary { op: BinOp::Add, lhs, rhs, .. } => Ok(const_eval_int(lhs)? + const_eval_int(rhs)?),
        Expr::Binary { op: BinOp::Sub, lhs, rhs, .. } => Ok(const_eval_int(lhs)? - const_eval_int(rhs)?),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::source_map::SourceMap;

    fn parse(src: &str) -> Unit {
        let mut sm = SourceMap::new();
        let file = sm.add_file("test.pas", src);
        let (tokens, diags) = lex(file, src);
        assert!(diags.is_empty(), "{:?}", diags);
        let mut resolver = NullResolver;
        let mut parser = Parser::new(tokens, &mut resolver);
        parser.parse_file().unwrap_or_else(|d| panic!("parse error: {}", d.message))
    }

    #[test]
    fn parses_hello_world() {
        let unit = parse("program hello; begin writeln('Hello, world!'); end.");
        assert_eq!(unit.name, "hello");
        let block = unit.main_block.unwrap();
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn parses_for_loop_sum() {
        let unit = parse(
            "program s; var i,total:integer; begin total:=0; for i:=1 to 10 do total:=total+i; writeln(total); end.",
        );
        let block = unit.main_block.unwrap();
        assert_eq!(block.vars.len(), 2);
        assert_eq!(block.statements.len(), 3);
    }

    #[test]
    fn parses_fixed_array_type() {
        let unit = parse("program r; var a:array[1..3] of integer; begin a[1]:=0; end.");
        let block = unit.main_block.unwrap();
        match &block.vars[0].ty {
            Type::FixedArray { lo, hi, .. } => {
                assert_eq!(*lo, 1);
                assert_eq!(*hi, 3);
            }
            other => panic!("expected fixed array, got {other:?}"),
        }
    }

    #[test]
    fn parses_case_over_strings() {
        let unit = parse(
            "program c; var s:string; begin s:='b'; case s of 'a': writeln(1); 'b': writeln(2); else writeln(3); end; end.",
        );
        let block = unit.main_block.unwrap();
        match &block.statements[1] {
            Statement::Case { arms, else_branch, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected case statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_enum_type_with_parens() {
        let unit = parse("program e; type Color = (Red, Green, Blue); begin end.");
        match unit.types.lookup("color") {
            Some(Type::Enum { variants }) => {
                assert_eq!(variants.len(), 3);
                assert_eq!(variants[0], ("Red".to_string(), 0));
            }
            other => panic!("expected enum type, got {other:?}"),
        }
    }

    #[test]
    fn parses_value_range_type_with_parens() {
        let unit = parse("program v; type R = (1..10); begin end.");
        match unit.types.lookup("r") {
            Some(Type::ValueRange { lo, hi }) => {
                assert_eq!(*lo, 1);
                assert_eq!(*hi, 10);
            }
            other => panic!("expected range type, got {other:?}"),
        }
    }

    #[test]
    fn parses_dynamic_array_grow_program() {
        let unit = parse(
            "program d; var a:array of integer; begin setlength(a,3); a[0]:=10; a[1]:=20; a[2]:=30; writeln(length(a),' ',a[0]+a[1]+a[2]); end.",
        );
        let block = unit.main_block.unwrap();
        match &block.vars[0].ty {
            Type::DynArray { .. } => {}
            other => panic!("expected dynamic array, got {other:?}"),
        }
        assert_eq!(block.statements.len(), 5);
    }
}
