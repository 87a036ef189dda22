//! Cthulhu compiler CLI
//!
//! Front door of the compiler collection: picks a language driver per input
//! by file extension, runs the shared pipeline, and optionally dumps the
//! lowered SSA.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use ctc::config::CompilerConfig;
use ctc::driver::VersionInfo;
use ctc::example::ExampleDriver;
use ctc::mediator::{Lifetime, Mediator};
use ctc::{EXIT_ERROR, EXIT_OK, run_pipeline};
use cthulhu_core::reports::Severity;
use cthulhu_core::scan::Scan;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "ctc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cthulhu compiler collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files
    Build {
        /// Input source files; the extension picks the language driver
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Configuration file (defaults to ctc.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dump the resolved tree IR to stdout
        #[arg(long)]
        emit_tree: bool,

        /// Dump the lowered SSA to stdout
        #[arg(long)]
        emit_ssa: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let status = match cli.command {
        Commands::Build {
            inputs,
            config,
            emit_tree,
            emit_ssa,
        } => build(&inputs, config.as_deref(), emit_tree, emit_ssa),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ctc", &mut io::stdout());
            EXIT_OK
        }
    };
    process::exit(status);
}

fn load_config(explicit: Option<&Path>) -> Result<CompilerConfig, String> {
    match explicit {
        Some(path) => CompilerConfig::load(path).map_err(|e| format!("{}: {}", path.display(), e)),
        None => {
            let default = Path::new("ctc.toml");
            if default.exists() {
                CompilerConfig::load(default).map_err(|e| format!("{}: {}", default.display(), e))
            } else {
                Ok(CompilerConfig::default())
            }
        }
    }
}

fn build(inputs: &[PathBuf], config_path: Option<&Path>, emit_tree: bool, emit_ssa: bool) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {}", message);
            return EXIT_ERROR;
        }
    };

    let version = parse_version(env!("CARGO_PKG_VERSION"));
    let mut lifetime = Lifetime::new(Mediator::new("ctc", version));
    lifetime.reports().set_limit(config.report_limit);
    lifetime.add_language(Rc::new(ExampleDriver));

    for input in inputs {
        let ext = input
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(driver) = lifetime.language_for(&ext) else {
            lifetime.reports().report(
                Severity::Fatal,
                None,
                format!("no language driver for `{}`", input.display()),
            );
            continue;
        };
        match std::fs::read_to_string(input) {
            Ok(text) => {
                let scan = Scan::new(driver.id(), input.clone(), text);
                lifetime.parse(driver, scan);
            }
            Err(error) => {
                lifetime.reports().report(
                    Severity::Fatal,
                    None,
                    format!("cannot read `{}`: {}", input.display(), error),
                );
            }
        }
    }

    let status = lifetime.reports().end("parse");
    if status != EXIT_OK {
        return status;
    }

    let status = run_pipeline(&mut lifetime);
    if status != EXIT_OK {
        return status;
    }

    if emit_tree || config.dump.tree {
        print!(
            "{}",
            ctc::dump::render(&lifetime.tcx, &lifetime.collect_modules())
        );
    }

    let ssa = lifetime.lower();
    let status = lifetime.reports().end("lower");
    if status != EXIT_OK {
        return status;
    }

    if emit_ssa || config.dump.ssa {
        print!("{}", ctc::ssa::emit::render(&ssa));
    }

    if config.werror && lifetime.reports().warning_count() > 0 {
        eprintln!(
            "error: {} warnings and warnings are errors",
            lifetime.reports().warning_count()
        );
        return EXIT_ERROR;
    }

    EXIT_OK
}

fn parse_version(text: &str) -> VersionInfo {
    let mut parts = text.split('.').map(|part| part.parse().unwrap_or(0));
    VersionInfo::new(
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}
