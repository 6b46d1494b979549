//! Ahead-of-time compiler front end and LLVM IR code generator for a
//! Pascal-family language: lex, macro-expand, parse (resolving `uses`
//! clauses), typecheck, and lower to textual LLVM IR. Handing that IR to
//! `clang`/`llc` to produce an object file is the caller's job.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod resolver;
pub mod source_map;
pub mod typechecker;
pub mod types;

use config::CompilerConfig;
use diagnostics::DiagnosticList;
use resolver::CompilationDriver;
use source_map::SourceMap;
use std::path::Path;

pub struct CompileOutput {
    pub ir: String,
    pub diagnostics: DiagnosticList,
}

/// Diagnostics plus the source map their spans resolve against — a
/// failed compile still needs both to render anything meaningful.
pub struct CompileFailure {
    pub diagnostics: DiagnosticList,
    pub source_map: SourceMap,
}

/// Runs the whole pipeline against `path` and, if every phase succeeded,
/// returns the generated LLVM IR. Accumulated diagnostics (including
/// warnings from a run that otherwise succeeded) are always returned
/// alongside it.
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<CompileOutput, CompileFailure> {
    let mut driver = CompilationDriver::new(config.rtl_dirs.clone());
    let unit = match driver.compile_entry(path) {
        Ok(unit) => unit,
        Err(diag) => {
            driver.diagnostics.push(diag);
            return Err(CompileFailure { diagnostics: driver.diagnostics, source_map: driver.source_map });
        }
    };

    let mut checker = typechecker::TypeChecker::new(&unit);
    checker.check();
    driver.diagnostics.extend(checker.diagnostics);
    if driver.diagnostics.has_fatal() {
        return Err(CompileFailure { diagnostics: driver.diagnostics, source_map: driver.source_map });
    }

    match codegen::program::codegen_unit(&unit) {
        Ok(ir) => Ok(CompileOutput { ir, diagnostics: driver.diagnostics }),
        Err(e) => {
            driver
                .diagnostics
                .push(diagnostics::Diagnostic::error(None, e.to_string()));
            Err(CompileFailure { diagnostics: driver.diagnostics, source_map: driver.source_map })
        }
    }
}

/// Runs lex through typecheck only, without emitting IR — the `check`
/// subcommand's entry point.
pub fn check_file(path: &Path, config: &CompilerConfig) -> CompileFailure {
    let mut driver = CompilationDriver::new(config.rtl_dirs.clone());
    let unit = match driver.compile_entry(path) {
        Ok(unit) => unit,
        Err(diag) => {
            driver.diagnostics.push(diag);
            return CompileFailure { diagnostics: driver.diagnostics, source_map: driver.source_map };
        }
    };
    let mut checker = typechecker::TypeChecker::new(&unit);
    checker.check();
    driver.diagnostics.extend(checker.diagnostics);
    CompileFailure { diagnostics: driver.diagnostics, source_map: driver.source_map }
}
