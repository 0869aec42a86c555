mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scriptorium-cli")]
#[command(about = "Scriptorium CLI - Run code in the sandbox and manage languages", long_about = None)]
struct Cli {
    /// languages.json with overrides (falls back to LANGUAGES_CONFIG, then built-ins)
    #[arg(long, global = true)]
    languages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file through the sandbox
    Run {
        /// Language name (e.g., python, java, rust)
        #[arg(short, long)]
        language: String,

        /// Source file to execute
        #[arg(short, long)]
        file: PathBuf,

        /// File to feed as stdin
        #[arg(long, conflicts_with = "input")]
        stdin: Option<PathBuf>,

        /// Literal stdin text
        #[arg(short, long)]
        input: Option<String>,
    },

    /// List supported languages
    Languages,

    /// Pull container images ahead of time
    PullImages {
        /// Only pull the image for this language
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Add or override a language in languages.json
    AddLang {
        /// Language name (e.g., bash, kotlin)
        #[arg(short, long)]
        name: String,

        /// Container image (e.g., bash:5)
        #[arg(long)]
        image: String,

        /// Source filename; may contain {class}
        #[arg(short, long)]
        source_file: String,

        /// Run command template; may contain {source} and {class}
        #[arg(short, long)]
        run: String,

        /// Compile command template
        #[arg(short, long)]
        compile: Option<String>,

        /// Config file to write
        #[arg(long, default_value = "config/languages.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
            input,
        } => {
            let code = commands::run_file(
                cli.languages.as_deref(),
                &language,
                &file,
                stdin.as_deref(),
                input.as_deref(),
            )
            .await?;
            std::process::exit(code);
        }
        Commands::Languages => {
            commands::list_languages(cli.languages.as_deref())?;
        }
        Commands::PullImages { name } => {
            commands::pull_images(cli.languages.as_deref(), name.as_deref()).await?;
        }
        Commands::AddLang {
            name,
            image,
            source_file,
            run,
            compile,
            config,
        } => {
            commands::add_language(&config, &name, &image, &source_file, &run, compile.as_deref())?;
        }
    }

    Ok(())
}
