//! `pasc`: command-line front end over the `pascalc` library.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use pascalc::config::CompilerConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pasc", about = "Ahead-of-time Pascal-family compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file to LLVM IR.
    Build {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long = "rtl-dir")]
        rtl_dirs: Vec<PathBuf>,
    },
    /// Lex, parse, and typecheck a source file without emitting IR.
    Check {
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a shell completion script.
    Completions { shell: Shell },
}

fn load_config(path: Option<&PathBuf>, extra_rtl_dirs: Vec<PathBuf>) -> CompilerConfig {
    let mut config = match path {
        Some(p) => CompilerConfig::load(p).unwrap_or_else(|e| {
            eprintln!("warning: {e}");
            CompilerConfig::default()
        }),
        None => CompilerConfig::default(),
    };
    config.rtl_dirs.extend(extra_rtl_dirs);
    config
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Build { input, output, config, rtl_dirs } => {
            let config = load_config(config.as_ref(), rtl_dirs);
            match pascalc::compile_file(&input, &config) {
                Ok(result) => {
                    match output {
                        Some(path) => {
                            if let Err(e) = std::fs::write(&path, &result.ir) {
                                eprintln!("error: cannot write '{}': {e}", path.display());
                                return ExitCode::FAILURE;
                            }
                        }
                        None => println!("{}", result.ir),
                    }
                    ExitCode::SUCCESS
                }
                Err(failure) => {
                    eprint!("{}", failure.diagnostics.render(&failure.source_map));
                    ExitCode::FAILURE
                }
            }
        }
        Command::Check { input, config } => {
            let config = load_config(config.as_ref(), Vec::new());
            let failure = pascalc::check_file(&input, &config);
            if failure.diagnostics.has_fatal() {
                eprint!("{}", failure.diagnostics.render(&failure.source_map));
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    }
}
