use std::path::{Path, PathBuf};

use crate::custody::{Custodian, Source};
use crate::error::Result;

/// A transform's explicit account of what it read and wrote, overriding the
/// defaults (`sources = [input]`, `outputs` = the declared output paths).
/// This is how hidden dependencies enter the custody graph: templates,
/// packed file lists, fetched URLs.
#[derive(Debug)]
pub struct Outcome {
    pub sources: Vec<Source>,
    pub outputs: Vec<PathBuf>,
}

impl Outcome {
    pub fn new(sources: Vec<Source>, outputs: Vec<PathBuf>) -> Self {
        Outcome { sources, outputs }
    }
}

/// A file-processing stage. Implementations must be idempotent with respect
/// to their declared sources: identical source content must produce
/// byte-identical outputs, or skipped reruns would be unsound.
pub trait Transform {
    /// A short identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Produce the declared outputs from `input`. Every path in `outputs`
    /// must exist afterwards. Returning `None` accepts the default custody
    /// accounting.
    fn apply(&self, input: &Path, outputs: &[PathBuf]) -> Result<Option<Outcome>>;

    /// Called once when the engine is constructed. The place to install
    /// freshness checkers for any custody kinds this transform records.
    fn register(&self, custodian: &mut Custodian) {
        let _ = custodian;
    }

    /// Verify external requirements (helper binaries, services) before any
    /// file is touched. Failing here is a configuration error.
    fn audit(&self) -> Result<()> {
        Ok(())
    }
}

/// A transform built from a closure, for pipelines whose stages don't
/// warrant a named type.
pub struct FnTransform {
    name: String,
    func: Box<dyn Fn(&Path, &[PathBuf]) -> Result<Option<Outcome>>>,
}

impl FnTransform {
    pub fn new<F>(name: &str, func: F) -> Self
        where F: Fn(&Path, &[PathBuf]) -> Result<Option<Outcome>> + 'static
    {
        FnTransform { name: name.to_string(), func: Box::new(func) }
    }
}

impl Transform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Path, outputs: &[PathBuf]) -> Result<Option<Outcome>> {
        (self.func)(input, outputs)
    }
}
