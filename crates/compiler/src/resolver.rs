//! Unit resolution & the compilation driver
//!
//! Resolves Pascal `uses` clauses to parsed units, caching each by canonical
//! path. The cache is an explicit field owned by [`CompilationDriver`], one
//! instance per compilation, so two concurrent compilations never share
//! state.

use crate::ast::Unit;
use crate::diagnostics::{Diagnostic, DiagnosticList};
use crate::lexer::lex;
use crate::macros::{expand, MacroTable};
use crate::parser::{Parser, UnitResolver};
use crate::source_map::SourceMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Default)]
pub struct UnitCache(HashMap<PathBuf, Rc<Unit>>);

impl UnitCache {
    pub fn new() -> Self {
        UnitCache(HashMap::new())
    }

    pub fn get(&self, path: &Path) -> Option<Rc<Unit>> {
        self.0.get(path).cloned()
    }

    pub fn insert(&mut self, path: PathBuf, unit: Rc<Unit>) {
        self.0.insert(path, unit);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Owns everything scoped to one compilation: the source map, the unit
/// cache, the in-progress set used for cycle detection, and the RTL
/// search path.
pub struct CompilationDriver {
    pub source_map: SourceMap,
    pub diagnostics: DiagnosticList,
    cache: UnitCache,
    in_progress: HashSet<PathBuf>,
    rtl_dirs: Vec<PathBuf>,
    search_dir: PathBuf,
}

impl CompilationDriver {
    pub fn new(rtl_dirs: Vec<PathBuf>) -> Self {
        CompilationDriver {
            source_map: SourceMap::new(),
            diagnostics: DiagnosticList::new(),
            cache: UnitCache::new(),
            in_progress: HashSet::new(),
            rtl_dirs,
            search_dir: PathBuf::new(),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Compile `path` as the entry file (a `program` or `unit`), resolving
    /// every transitive `uses` clause.
    pub fn compile_entry(&mut self, path: &Path) -> Result<Unit, Diagnostic> {
        self.search_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Diagnostic::error(None, format!("cannot read '{}': {e}", path.display())))?;
        self.parse_text(path, &text)
    }

    fn parse_text(&mut self, path: &Path, text: &str) -> Result<Unit, Diagnostic> {
        let file = self.source_map.add_file(path, text);
        let (tokens, lex_diags) = lex(file, text);
        self.diagnostics.extend(lex_diags);
        if self.diagnostics.has_fatal() {
            return Err(Diagnostic::error(None, "lexing failed"));
        }

        let mut table = MacroTable::with_platform_defaults();
        let (tokens, macro_diags) = expand(tokens, &mut table);
        self.diagnostics.extend(macro_diags);
        if self.diagnostics.has_fatal() {
            return Err(Diagnostic::error(None, "macro expansion failed"));
        }

        let search_dir = self.search_dir.clone();
        let mut scope = ResolverScope { driver: self, search_dir };
        let mut parser = Parser::new(tokens, &mut scope);
        parser.parse_file()
    }

    fn resolve_uses(&mut self, name: &str, search_dir: &Path) -> Result<Unit, Diagnostic> {
        let path = self
            .find_unit_file(name, search_dir)
            .ok_or_else(|| Diagnostic::error(None, format!("unit '{name}' not found")))?;
        let canonical = path.canonicalize().unwrap_or(path.clone());

        if let Some(cached) = self.cache.get(&canonical) {
            return Ok((*cached).clone());
        }
        if self.in_progress.contains(&canonical) {
            return Err(Diagnostic::error(None, format!("cyclic 'uses' detected at unit '{name}'")));
        }

        self.in_progress.insert(canonical.clone());
        let text = std::fs::read_to_string(&canonical)
            .map_err(|e| Diagnostic::error(None, format!("cannot read '{}': {e}", canonical.display())))?;
        let result = self.parse_text(&canonical, &text);
        self.in_progress.remove(&canonical);

        let unit = result?;
        self.cache.insert(canonical, Rc::new(unit.clone()));
        Ok(unit)
    }

    fn find_unit_file(&self, name: &str, search_dir: &Path) -> Option<PathBuf> {
        let candidate = search_dir.join(format!("{name}.pas"));
        if candidate.is_file() {
            return Some(candidate);
        }
        for dir in &self.rtl_dirs {
            let candidate = dir.join(format!("{name}.pas"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Adapts [`CompilationDriver`] to the [`UnitResolver`] the parser expects,
/// carrying the importing file's directory (uses resolution is relative to
/// the *importer*, not the entry file).
struct ResolverScope<'d> {
    driver: &'d mut CompilationDriver,
    search_dir: PathBuf,
}

impl<'d> UnitResolver for ResolverScope<'d> {
    fn resolve(&mut self, name: &str) -> Result<Unit, Diagnostic> {
        self.driver.resolve_uses(name, &self.search_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn resolves_and_caches_a_used_unit_once() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "m.pas",
            "unit m; interface function inc(x:integer):integer; implementation function inc(x:integer):integer; begin inc:=x+1; end; end.",
        );
        let prog = write_file(
            dir.path(),
            "p.pas",
            "program p; uses m; begin writeln(inc(41)); end.",
        );

        let mut driver = CompilationDriver::new(vec![]);
        let unit = driver.compile_entry(&prog).unwrap_or_else(|d| panic!("{}", d.message));
        assert!(unit.function_by_name("inc").is_some());
        // system.pas doesn't exist in this fixture dir, so only `m` resolves
        // successfully; the implicit `uses system` import is expected to fail
        // and is exercised separately in the end-to-end pipeline tests with a
        // real RTL directory. Here we only assert `m` was cached exactly once.
        assert_eq!(driver.cache_len(), 1);
    }

    #[test]
    fn detects_cyclic_uses() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.pas", "unit a; interface implementation uses b; end.");
        write_file(dir.path(), "b.pas", "unit b; interface implementation uses a; end.");
        let prog = write_file(dir.path(), "p.pas", "program p; uses a; begin end.");

        let mut driver = CompilationDriver::new(vec![]);
        let result = driver.compile_entry(&prog);
        assert!(result.is_err());
    }
}
