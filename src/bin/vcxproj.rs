//! Command-line front end for reading and editing `.vcxproj` files.
//!
//! Usage:
//!   vcxproj show app.vcxproj --platform "Debug|x64"
//!   vcxproj show-raw app.vcxproj --platform "Debug|x64"
//!   vcxproj solution all.sln --platform "Release|Win32"
//!   vcxproj find app.vcxproj src/main.cpp
//!   vcxproj add app.vcxproj src/new.cpp
//!   vcxproj remove app.vcxproj src/old.cpp
//!
//! Logging goes to stderr; `RUST_LOG` overrides the level picked by `-v`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vcxproj_rs::edit::{self, EditOptions, NoFilters};
use vcxproj_rs::{CaseSensitivity, Indent, Project, ProjectRaw, Solution, Vcxproj, VcxprojBuilder};

#[derive(Parser, Debug)]
#[command(name = "vcxproj")]
#[command(version)]
#[command(about = "Read and edit Visual C++ project files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log what is being read and written (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// How source paths are compared with stored references
    #[arg(long, global = true, value_enum, default_value_t = Case::Insensitive)]
    case: Case,

    /// Indent saved files with this many spaces (0 writes one line)
    #[arg(long, global = true, default_value_t = 2)]
    indent: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a project's settings for one platform, paths resolved
    Show {
        project: PathBuf,
        #[arg(long, short = 'p')]
        platform: String,
    },
    /// Print a project's settings for one platform, paths as written
    ShowRaw {
        project: PathBuf,
        #[arg(long, short = 'p')]
        platform: String,
    },
    /// Print every C++ project listed by a solution
    Solution {
        solution: PathBuf,
        #[arg(long, short = 'p')]
        platform: String,
    },
    /// Report whether a source file is referenced
    Find { project: PathBuf, source: PathBuf },
    /// Add a source file reference
    Add { project: PathBuf, source: PathBuf },
    /// Remove every reference to a source file (project or .filters file)
    Remove { file: PathBuf, source: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Case {
    Default,
    Sensitive,
    Insensitive,
}

impl From<Case> for CaseSensitivity {
    fn from(case: Case) -> Self {
        match case {
            Case::Default => CaseSensitivity::Default,
            Case::Sensitive => CaseSensitivity::Sensitive,
            Case::Insensitive => CaseSensitivity::Insensitive,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let indent = if cli.indent == 0 { Indent::none() } else { Indent::spaces(cli.indent) };
    let options = EditOptions {
        case: CaseSensitivity::from(cli.case).resolve(),
        indent,
        cwd: None,
    };

    match run(cli.command, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, options: &EditOptions) -> vcxproj_rs::Result<()> {
    match command {
        Commands::Show { project, platform } => {
            print!("{}", Project::read(&project, &platform)?);
        }
        Commands::ShowRaw { project, platform } => {
            print!("{}", ProjectRaw::read(&project, &platform)?);
        }
        Commands::Solution { solution, platform } => {
            print!("{}", Solution::read(&solution, &platform)?);
        }
        Commands::Find { project, source } => {
            let handle: Vcxproj = VcxprojBuilder::new()
                .case_sensitivity(options.case)
                .from_file(&project)?;
            let found = handle.find_source(&source)?;
            for node in &found {
                if let Some(literal) = handle.document().attribute(*node, "Include") {
                    println!("{literal}");
                }
            }
            if found.is_empty() {
                println!("{} is not referenced", source.display());
            }
        }
        Commands::Add { project, source } => {
            edit::add_to_project(&project, &source, options, &NoFilters)?;
        }
        Commands::Remove { file, source } => {
            let removed = edit::remove_from(&file, &source, options)?;
            println!("removed {removed} reference(s)");
        }
    }
    Ok(())
}
