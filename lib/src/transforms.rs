use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::rule::{Outcome, Transform};
use crate::util::ensure_parent;

/// Create every output's parent directory.
pub fn ensure_output_dirs(outputs: &[PathBuf]) -> Result<()> {
    for output in outputs {
        ensure_parent(output)?;
    }

    Ok(())
}

/// Copy the first output over the remaining ones. The usual way a transform
/// honors fan-out after producing its result once.
pub fn duplicate_first_output(outputs: &[PathBuf]) -> Result<()> {
    let (first, rest) = match outputs.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };

    for output in rest {
        fs::copy(first, output)
            .map_err(|source| Error::io("duplicate output to", output, source))?;
    }

    Ok(())
}

/// Copies the input to every output byte-for-byte.
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply(&self, input: &Path, outputs: &[PathBuf]) -> Result<Option<Outcome>> {
        ensure_output_dirs(outputs)?;
        for output in outputs {
            fs::copy(input, output)
                .map_err(|source| Error::io("copy to", output, source))?;
        }

        Ok(None)
    }
}

type ArgBuilder = Box<dyn Fn(&Path, &Path) -> Vec<OsString>>;

/// Runs an external command to produce each output. Outputs are grouped by
/// extension; the command runs once per group and the remaining members are
/// copies of the first.
pub struct CommandTransform {
    name: String,
    program: OsString,
    args: ArgBuilder,
}

impl CommandTransform {
    /// `args` receives the input path and the output path the command must
    /// create.
    pub fn new<F>(name: &str, program: impl AsRef<OsStr>, args: F) -> Self
        where F: Fn(&Path, &Path) -> Vec<OsString> + 'static
    {
        CommandTransform {
            name: name.to_string(),
            program: program.as_ref().to_os_string(),
            args: Box::new(args),
        }
    }

    fn run_once(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args((self.args)(input, output))
            .output()
            .map_err(|source| Error::command(
                self.program.to_string_lossy(),
                format!("cannot launch: {source}"),
            ))?;

        if !result.status.success() {
            let mut detail = format!("{} on {}", result.status, input.display());
            if !result.stderr.is_empty() {
                detail.push_str(": ");
                detail.push_str(String::from_utf8_lossy(&result.stderr).trim_end());
            }

            return Err(Error::command(self.program.to_string_lossy(), detail));
        }

        Ok(())
    }
}

impl Transform for CommandTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Path, outputs: &[PathBuf]) -> Result<Option<Outcome>> {
        ensure_output_dirs(outputs)?;

        let mut groups: BTreeMap<OsString, Vec<&PathBuf>> = BTreeMap::new();
        for output in outputs {
            let ext = output.extension().unwrap_or_default().to_os_string();
            groups.entry(ext).or_default().push(output);
        }

        for group in groups.values() {
            let (first, rest) = group.split_first().expect("groups are non-empty");
            self.run_once(input, first)?;
            for output in rest {
                fs::copy(first, output)
                    .map_err(|source| Error::io("duplicate command output to", output, source))?;
            }
        }

        Ok(None)
    }

    fn audit(&self) -> Result<()> {
        if find_in_path(&self.program).is_none() {
            return Err(Error::command(
                self.program.to_string_lossy(),
                format!("not found on PATH (needed by {})", self.name),
            ));
        }

        Ok(())
    }
}

fn find_in_path(program: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
