use std::process::ExitCode;

use bowerbird::error::Result;
use bowerbird::{Context, Settings};

mod config;
mod markdown;
mod pipeline;

use crate::config::Config;

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Your friendly neighborhood nest builder.
        cmd weaverbird {
            /// Build a project.
            default cmd build {
                /// Directory containing the source files
                required input: PathBuf
                /// Where to write final artifacts (default: {input}/build)
                optional -o,--output output: PathBuf
                /// Directory for intermediate files (default: a fresh temp dir)
                optional -w,--working working: PathBuf
                /// Cache file enabling incremental rebuilds
                optional --custody-cache cache: PathBuf
                /// Empty the output and working directories first
                optional --purge
                /// Don't narrate processing steps
                optional -q,--quiet
            }
            /// Print the version and exit.
            cmd version { }
        }
    }
}

fn configure(args: &flags::Build) -> Result<Context> {
    let config = Config::discover(&args.input)?;

    let mut builder = Settings::builder(&args.input);
    if let Some(output) = args.output.clone().or_else(|| config.output(&args.input)) {
        builder = builder.output(output);
    }

    if let Some(working) = args.working.clone().or_else(|| config.working(&args.input)) {
        builder = builder.working(working);
    }

    if let Some(cache) = args.custody_cache.clone().or_else(|| config.custody_cache(&args.input)) {
        builder = builder.custody_cache(cache);
    }

    let purge = args.purge || config.purge();
    let settings = builder.purge_dirs(purge).build()?;

    let context = Context::new(settings, pipeline::rules()?)?;
    Ok(context.quiet(args.quiet))
}

fn build(args: &flags::Build) -> ExitCode {
    let mut context = match configure(args) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    match context.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    match flags::Weaverbird::from_env_or_exit().subcommand {
        flags::WeaverbirdCmd::Build(args) => build(&args),
        flags::WeaverbirdCmd::Version(_) => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}
