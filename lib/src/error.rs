//! Error types for the bowerbird engine.

use std::io;
use std::path::Path;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while configuring or executing a build, grouped by the
/// way builds actually fail. The grouping is what drivers key exit codes
/// and retry decisions off: configuration and rule errors mean the build
/// could never have run, the rest mean it ran and broke.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The settings cannot describe a runnable build.
    #[error("invalid build configuration: {message}")]
    Config { message: String },

    /// A rule is broken: an unparseable pattern, or a path calculator that
    /// produced a path no build directory contains.
    #[error("broken rule: {message}")]
    Rule { message: String },

    /// A transform failed while processing one input file.
    #[error("transform {name} failed on {input}: {source}")]
    Transform {
        name: String,
        input: String,
        source: Box<Error>,
    },

    /// An external command a transform depends on is missing or failed.
    #[error("command {program}: {detail}")]
    Command { program: String, detail: String },

    /// Custody bookkeeping failed: the cache cannot be written, a recorded
    /// entry has no checker, or prior records are inconsistent.
    #[error("custody error: {message}")]
    Custody { message: String },

    /// The working-directory fixpoint will not settle.
    #[error("processing cycle: {message}")]
    Cycle { message: String },

    /// A filesystem operation failed.
    #[error("cannot {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        source: io::Error,
    },

    /// A failure raised inside user transform code that fits no other
    /// class.
    #[error("{message}")]
    Other { message: String },

    /// Independent per-file failures collected under the robust error
    /// policy.
    #[error("{}", render_batch(.0))]
    Batch(Vec<Error>),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Error {
        Error::Config { message: message.into() }
    }

    pub fn rule(message: impl Into<String>) -> Error {
        Error::Rule { message: message.into() }
    }

    pub fn custody(message: impl Into<String>) -> Error {
        Error::Custody { message: message.into() }
    }

    pub fn cycle(message: impl Into<String>) -> Error {
        Error::Cycle { message: message.into() }
    }

    pub fn other(message: impl Into<String>) -> Error {
        Error::Other { message: message.into() }
    }

    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Error {
        Error::Io {
            op,
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn command(program: impl Into<String>, detail: impl Into<String>) -> Error {
        Error::Command {
            program: program.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a failure with the transform and input it happened in.
    pub fn transform(name: &str, input: &Path, source: Error) -> Error {
        Error::Transform {
            name: name.to_string(),
            input: input.display().to_string(),
            source: Box::new(source),
        }
    }

    /// Fold collected failures into one error. `None` when nothing failed;
    /// a single failure is returned unwrapped.
    pub fn batch(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Batch(errors)),
        }
    }
}

fn render_batch(errors: &[Error]) -> String {
    let mut out = format!("{} file(s) failed to process", errors.len());
    for error in errors {
        out.push_str("\n  ");
        out.push_str(&error.to_string().replace('\n', "\n  "));
    }

    out
}
