//! Compiler configuration
//!
//! A small `toml`-backed settings file (`pascalc.toml`) sitting alongside
//! the CLI flags: flags win when both specify the same setting.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompilerConfig {
    /// Additional directories searched for `uses`d units after the
    /// importing file's own directory.
    #[serde(default)]
    pub rtl_dirs: Vec<PathBuf>,

    /// Emit the generated LLVM IR to stdout instead of a `.ll` file.
    #[serde(default)]
    pub emit_stdout: bool,

    /// `{$define ...}` names active before the first line of source,
    /// beyond the platform defaults `with_platform_defaults` seeds.
    #[serde(default)]
    pub defines: Vec<String>,
}

impl CompilerConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("invalid config '{}': {e}", path.display()))
    }

    pub fn with_rtl_dir(mut self, dir: PathBuf) -> Self {
        self.rtl_dirs.push(dir);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rtl_dirs_and_defines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pascalc.toml");
        std::fs::write(&path, "rtl_dirs = [\"rtl\"]\ndefines = [\"DEBUG\"]\n").unwrap();
        let cfg = CompilerConfig::load(&path).unwrap();
        assert_eq!(cfg.rtl_dirs, vec![PathBuf::from("rtl")]);
        assert_eq!(cfg.defines, vec!["DEBUG".to_string()]);
    }

    #[test]
    fn missing_config_is_an_error() {
        let result = CompilerConfig::load(Path::new("/does/not/exist.toml"));
        assert!(result.is_err());
    }
}
