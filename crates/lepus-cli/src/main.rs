mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lepus_bytecode::{CompiledUnit, disassemble};
use lepus_compiler::{Compiler, Node};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "lepusc", version, about = "Lepus bytecode compiler")]
struct Cli {
    /// Path to a lepus.toml (searched upward from the current directory by default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an AST JSON document
    Compile {
        /// AST JSON file
        input: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Output format
        #[arg(long, value_enum, default_value_t = Emit::Disasm)]
        emit: Emit,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile an AST JSON document and report errors only
    Check {
        /// AST JSON file
        input: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Target SDK version ("null" for the newest)
    #[arg(long)]
    sdk_version: Option<String>,
    /// Host global name (repeatable)
    #[arg(long = "global")]
    globals: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    /// Human-readable disassembly
    Disasm,
    /// Compiled unit as JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile {
            input,
            target,
            emit,
            output,
        } => {
            let unit = compile_file(&input, &config, &target)?;
            let text = match emit {
                Emit::Disasm => disassemble(&unit.root),
                Emit::Json => unit.to_json()?,
            };
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{text}"),
            }
        }
        Commands::Check { input, target } => {
            let unit = compile_file(&input, &config, &target)?;
            println!(
                "{}: ok ({} functions, sdk {})",
                input.display(),
                unit.function_count(),
                unit.sdk_version
            );
        }
    }

    Ok(())
}

fn compile_file(input: &Path, config: &config::Config, target: &TargetArgs) -> Result<CompiledUnit> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut ast: Node = serde_json::from_str(&source)
        .with_context(|| format!("Failed to parse AST from {}", input.display()))?;
    let nodes = ast.renumber();
    tracing::debug!(nodes, "loaded AST");

    let options = config.compile_options(target.sdk_version.as_deref(), &target.globals)?;
    let unit = Compiler::new(options)
        .compile(&ast)
        .with_context(|| format!("Failed to compile {}", input.display()))?;
    Ok(unit)
}
