// Language table: image, source filename and command templates per language.
// Loaded from built-in defaults, optionally overridden by languages.json.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder for the source filename inside command templates
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder for the Java public class name
pub const CLASS_PLACEHOLDER: &str = "{class}";

const DEFAULT_CLASS_NAME: &str = "Main";

lazy_static! {
    static ref PUBLIC_CLASS: Regex = Regex::new(r"public\s+class\s+(\w+)").unwrap();
}

/// Best-effort name of the first public class in a Java source file.
///
/// Assumes a single public class with a plain declaration; falls back to
/// `Main` when nothing matches. Not a parser.
pub fn public_class_name(source: &str) -> &str {
    PUBLIC_CLASS
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_CLASS_NAME)
}

#[derive(Debug, Error)]
pub enum LanguageConfigError {
    #[error("language config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid entry for '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// One row of the language table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub name: String,
    pub image: String,
    /// Filename the source is written to; may contain `{class}`
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<String>,
    pub run: String,
}

impl LanguageSpec {
    fn new(name: &str, image: &str, source_file: &str, compile: Option<&str>, run: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            source_file: source_file.to_string(),
            compile: compile.map(str::to_string),
            run: run.to_string(),
        }
    }

    /// Concrete source filename for this program
    pub fn source_filename(&self, source: &str) -> String {
        if self.source_file.contains(CLASS_PLACEHOLDER) {
            self.source_file
                .replace(CLASS_PLACEHOLDER, public_class_name(source))
        } else {
            self.source_file.clone()
        }
    }

    /// Shell command run inside the container: optional compile step, then
    /// the run step with stdin redirected from `input_file`.
    pub fn shell_command(&self, source_file: &str, input_file: &str) -> String {
        let class = Path::new(source_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_CLASS_NAME);
        let render = |template: &str| {
            template
                .replace(SOURCE_PLACEHOLDER, source_file)
                .replace(CLASS_PLACEHOLDER, class)
        };

        let run = format!("{} < {}", render(&self.run), input_file);
        match &self.compile {
            Some(compile) => format!("{} && {}", render(compile), run),
            None => run,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Reject entries that could never run or would write outside the workspace
    pub fn check(&self) -> Result<(), LanguageConfigError> {
        let invalid = |reason: &str| LanguageConfigError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.image.trim().is_empty() {
            return Err(invalid("image is empty"));
        }
        if self.run.trim().is_empty() {
            return Err(invalid("run command is empty"));
        }
        if self.source_file.contains('/') || self.source_file.contains('\\') {
            return Err(invalid("source_file must be a bare filename"));
        }
        Ok(())
    }
}

/// On-disk shape of `languages.json`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageSpec>,
}

/// Fixed, read-only map from language name to its spec
#[derive(Debug, Clone)]
pub struct LanguageTable {
    specs: HashMap<String, LanguageSpec>,
}

impl LanguageTable {
    pub fn builtin() -> Self {
        let specs = [
            LanguageSpec::new("python", "python:3.12-slim", "main.py", None, "python3 -u {source}"),
            LanguageSpec::new("javascript", "node:20-slim", "main.js", None, "node {source}"),
            LanguageSpec::new(
                "java",
                "eclipse-temurin:21-jdk",
                "{class}.java",
                Some("javac {source}"),
                "java {class}",
            ),
            LanguageSpec::new("c", "gcc:13", "main.c", Some("gcc -Wall -o main {source}"), "./main"),
            LanguageSpec::new("cpp", "gcc:13", "main.cpp", Some("g++ -Wall -o main {source}"), "./main"),
            LanguageSpec::new("rust", "rust:1.79-slim", "main.rs", Some("rustc -o main {source}"), "./main"),
            LanguageSpec::new("go", "golang:1.22", "main.go", None, "go run {source}"),
            LanguageSpec::new("ruby", "ruby:3.3-slim", "main.rb", None, "ruby {source}"),
            LanguageSpec::new("php", "php:8.3-cli", "main.php", None, "php {source}"),
            LanguageSpec::new("perl", "perl:5.38-slim", "main.pl", None, "perl {source}"),
            LanguageSpec::new("lua", "nickblah/lua:5.4", "main.lua", None, "lua {source}"),
        ];

        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Built-in table with entries from `config_path` merged on top.
    /// Known names are replaced, unknown names are added.
    pub fn load(config_path: &Path) -> Result<Self, LanguageConfigError> {
        if !config_path.exists() {
            return Err(LanguageConfigError::NotFound(config_path.to_path_buf()));
        }

        let content = fs::read_to_string(config_path).map_err(|source| LanguageConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;

        let languages_json: LanguagesJson =
            serde_json::from_str(&content).map_err(|source| LanguageConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })?;

        let mut table = Self::builtin();
        for mut spec in languages_json.languages {
            spec.check()?;
            spec.name = spec.name.to_lowercase();
            table.specs.insert(spec.name.clone(), spec);
        }

        Ok(table)
    }

    /// Case-insensitive lookup
    pub fn get(&self, language: &str) -> Option<&LanguageSpec> {
        self.specs.get(&language.to_lowercase())
    }

    pub fn contains(&self, language: &str) -> bool {
        self.get(language).is_some()
    }

    /// Sorted language names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Specs sorted by name
    pub fn specs(&self) -> Vec<&LanguageSpec> {
        let mut specs: Vec<&LanguageSpec> = self.specs.values().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}
