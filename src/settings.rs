//! Settings infrastructure for langmode.
//!
//! Settings come from a `settings.toml` file found near the workspace root:
//!
//! ```toml
//! [workers]
//! count = 2
//!
//! [tokenizer]
//! max_line_length = 20000
//!
//! [[grammars]]
//! path = "grammars/custom.toml"
//!
//! [modes.less]
//! lint = { unbalanced_braces = "warning" }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::lexer::{CompileError, Grammar};

/// Root settings structure loaded from settings.toml.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workers: WorkerSettings,
    pub tokenizer: TokenizerSettings,
    /// Extra grammars, each registered as its own language.
    pub grammars: Vec<GrammarSettings>,
    pub modes: ModeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker instances per language.
    pub count: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { count: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenizerSettings {
    /// Lines longer than this are tokenized up to the limit only.
    pub max_line_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrammarSettings {
    /// Relative to the directory holding settings.toml.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModeSettings {
    pub less: LessOptions,
}

/// Options of the LESS mode, also accepted at runtime through configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LessOptions {
    pub lint: LessLint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LessLint {
    pub unbalanced_braces: LintSeverity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    #[default]
    Error,
    Warning,
    Ignore,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid grammar {path}: {source}")]
    Grammar {
        path: PathBuf,
        source: CompileError,
    },
}

/// Load settings from a settings.toml file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse settings.toml");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover settings.toml by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found settings.toml (used for resolving relative paths).
/// If not found, returns `(Settings::default(), start_dir)`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    // Phase 1: Walk up from start_dir
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join("settings.toml");
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Phase 2: Check immediate child directories
    if let Ok(entries) = std::fs::read_dir(start_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join("settings.toml");
                if candidate.is_file() {
                    return (load_settings(&candidate), entry.path());
                }
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}

/// Read and parse a grammar file. Relative paths resolve against `base_dir`.
pub fn load_grammar(base_dir: &Path, path: &Path) -> Result<Grammar, SettingsError> {
    let path = base_dir.join(path);
    let source = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
        path: path.clone(),
        source,
    })?;
    Grammar::from_toml(&source).map_err(|source| SettingsError::Parse { path, source })
}

/// Every grammar listed in `settings`. Grammars that fail to load are logged
/// and skipped.
pub fn load_grammars(settings: &Settings, base_dir: &Path) -> Vec<Grammar> {
    settings
        .grammars
        .iter()
        .filter_map(|entry| match load_grammar(base_dir, &entry.path) {
            Ok(grammar) => Some(grammar),
            Err(e) => {
                tracing::warn!(error = %e, "skipping grammar");
                None
            }
        })
        .collect()
}
