// CLI commands for Scriptorium
use anyhow::{bail, Context, Result};
use scriptorium_common::config::SandboxConfig;
use scriptorium_common::languages::{LanguageSpec, LanguageTable, LanguagesJson};
use scriptorium_common::types::Classification;
use scriptorium_sandbox::{DockerEngine, Executor};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Resolve the language table: explicit flag, then LANGUAGES_CONFIG, then built-ins
fn load_table(flag: Option<&Path>, config: &SandboxConfig) -> Result<LanguageTable> {
    match flag.or(config.languages_config.as_deref()) {
        Some(path) => LanguageTable::load(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(LanguageTable::builtin()),
    }
}

/// Run a file through the same pipeline as `POST /execute`.
/// Returns the process exit code: 0 only for a completed run.
pub async fn run_file(
    languages: Option<&Path>,
    language: &str,
    file: &Path,
    stdin_file: Option<&Path>,
    input: Option<&str>,
) -> Result<i32> {
    let config = SandboxConfig::from_env();
    let table = load_table(languages, &config)?;

    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let stdin = match (stdin_file, input) {
        (Some(path), _) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text.to_string(),
        (None, None) => String::new(),
    };

    let engine = DockerEngine::connect()?;
    let executor = Executor::new(table, Arc::new(engine), &config);

    let body = serde_json::json!({
        "language": language,
        "source": source,
        "stdin": stdin,
    });
    let outcome = executor.execute_json(&body).await?;

    print!("{}", outcome.stdout);
    if !outcome.stderr.is_empty() {
        eprintln!("{}", outcome.stderr);
    }
    eprintln!(
        "→ {} (exit code: {}, {}ms)",
        outcome.classification,
        outcome
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
        outcome.execution_time_ms
    );

    Ok(if outcome.classification == Classification::Completed { 0 } else { 1 })
}

/// Print the language table
pub fn list_languages(languages: Option<&Path>) -> Result<()> {
    let config = SandboxConfig::from_env();
    let table = load_table(languages, &config)?;

    println!("{:<12} {:<28} {:<16} {}", "LANGUAGE", "IMAGE", "SOURCE", "COMMAND");
    for spec in table.specs() {
        let source_file = spec.source_filename("");
        println!(
            "{:<12} {:<28} {:<16} {}",
            spec.name,
            spec.image,
            spec.source_file,
            spec.shell_command(&source_file, "input.txt")
        );
    }
    Ok(())
}

/// Pull images so the first execution does not pay for the download
pub async fn pull_images(languages: Option<&Path>, name: Option<&str>) -> Result<()> {
    let config = SandboxConfig::from_env();
    let table = load_table(languages, &config)?;

    let mut images: Vec<String> = match name {
        Some(name) => match table.get(name) {
            Some(spec) => vec![spec.image.clone()],
            None => bail!("Unknown language '{}'. Available: {:?}", name, table.names()),
        },
        None => table.specs().into_iter().map(|s| s.image.clone()).collect(),
    };
    images.sort();
    images.dedup();

    let engine = DockerEngine::connect()?;
    for image in &images {
        println!("📦 Pulling {}", image);
        engine.ensure_image(image).await?;
    }

    println!("✅ {} image(s) ready", images.len());
    Ok(())
}

/// Load languages.json, or an empty list when it does not exist yet
fn load_languages_config(config_path: &Path) -> Result<LanguagesJson> {
    if !config_path.exists() {
        return Ok(LanguagesJson::default());
    }

    let content = fs::read_to_string(config_path)
        .context("Failed to read languages.json")?;
    serde_json::from_str(&content)
        .context("Failed to parse languages.json")
}

fn save_languages_config(config_path: &Path, config: &LanguagesJson) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(config)
        .context("Failed to serialize languages.json")?;
    fs::write(config_path, json_content)
        .context("Failed to write languages.json")?;

    Ok(())
}

/// Add a language entry to languages.json.
/// Built-in names are allowed and override the built-in entry when loaded.
pub fn add_language(
    config_path: &Path,
    name: &str,
    image: &str,
    source_file: &str,
    run: &str,
    compile: Option<&str>,
) -> Result<()> {
    let name = name.trim().to_lowercase();
    let spec = LanguageSpec {
        name: name.clone(),
        image: image.to_string(),
        source_file: source_file.to_string(),
        compile: compile.map(str::to_string),
        run: run.to_string(),
    };
    spec.check()?;

    let mut languages_json = load_languages_config(config_path)?;
    if languages_json.languages.iter().any(|l| l.name.to_lowercase() == name) {
        bail!("Language '{}' already exists in {}", name, config_path.display());
    }

    if LanguageTable::builtin().contains(&name) {
        println!("ℹ '{}' is built in; this entry will override it", name);
    }

    languages_json.languages.push(spec);

    save_languages_config(config_path, &languages_json)?;
    println!("✅ Added '{}' to {}", name, config_path.display());
    Ok(())
}
