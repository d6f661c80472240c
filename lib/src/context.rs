use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;

use crate::custody::{Custodian, Freshness, Source};
use crate::discover::discover;
use crate::error::{Error, Result};
use crate::rule::{Outcome, Rule, Witness};
use crate::settings::{Dirs, Settings};
use crate::util::remove_children;

/// Passes over the working directory before the fixpoint is declared
/// divergent.
const MAX_PASSES: usize = 64;

/// How often one rule may produce the same working-directory file before the
/// engine calls it a loop.
const LOOP_LIMIT: u32 = 2;

/// What the engine does when a transform fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the build on the first failure.
    #[default]
    Strict,
    /// Keep processing other files; report every failure at the end.
    Robust,
}

/// A planned unit of work: one input file, the rule that claimed it, and the
/// output paths its calculators produced.
#[derive(Debug)]
pub struct Task {
    pub rule: usize,
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub halt: bool,
}

/// The engine: owns the settings, the immutable rule sequence, and the
/// custodian, and drives a build from discovery to cache save.
pub struct Context {
    settings: Settings,
    rules: Vec<Rule>,
    custodian: Custodian,
    policy: ErrorPolicy,
    quiet: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl Context {
    pub fn new(settings: Settings, rules: Vec<Rule>) -> Result<Self> {
        Context::with_custodian(settings, rules, Custodian::new())
    }

    /// Build an engine around an existing custodian (one carrying extra
    /// cache parameters or pre-registered kinds). Every transform is audited
    /// and given the chance to register its custody kinds; an audit failure
    /// is a configuration error and aborts construction.
    pub fn with_custodian(
        settings: Settings,
        rules: Vec<Rule>,
        mut custodian: Custodian,
    ) -> Result<Self> {
        custodian.bind(&settings, false);
        for rule in &rules {
            if let Some(transform) = rule.transform.as_deref() {
                transform.audit().map_err(|e| Error::config(format!(
                    "transform {} is unavailable: {e}",
                    transform.name(),
                )))?;

                transform.register(&mut custodian);
            }
        }

        Ok(Context {
            settings,
            rules,
            custodian,
            policy: ErrorPolicy::default(),
            quiet: false,
            cancel: None,
        })
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        // Rebind so the custodian's step log follows suit.
        self.custodian.bind(&self.settings, quiet);
        self
    }

    /// Install a cooperative cancellation flag. When raised, the engine
    /// finishes the transform in flight, abandons the rest of the build, and
    /// still saves custody state.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn dirs(&self) -> &Dirs {
        self.settings.dirs()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn custodian(&self) -> &Custodian {
        &self.custodian
    }

    /// Scan the rules for each path, in order, and collect the tasks of one
    /// pass. The first matching rule claims the file; drop rules claim it
    /// without work.
    pub fn plan(&self, paths: &[PathBuf]) -> Result<Vec<Task>> {
        let dirs = self.settings.dirs();
        let mut tasks = vec![];

        for path in paths {
            for (index, rule) in self.rules.iter().enumerate() {
                let witness = match rule.matcher.matches(dirs, path) {
                    Some(witness) => witness,
                    None => continue,
                };

                if rule.is_drop() {
                    break;
                }

                tasks.push(Task {
                    rule: index,
                    input: path.clone(),
                    outputs: self.output_paths(rule, path, &witness)?,
                    halt: rule.halts(),
                });
                break;
            }
        }

        Ok(tasks)
    }

    fn output_paths(&self, rule: &Rule, path: &Path, witness: &Witness) -> Result<Vec<PathBuf>> {
        let dirs = self.settings.dirs();
        let mut outputs: Vec<PathBuf> = vec![];
        for calc in &rule.calcs {
            let output = calc.output_path(dirs, path, witness)?;
            if !outputs.contains(&output) {
                outputs.push(output);
            }
        }

        Ok(outputs)
    }

    /// Run one planned task: consult the custodian, invoke the transform
    /// when stale, and record the result. Returns the outputs that now stand
    /// for this input downstream.
    fn execute(&mut self, task: &Task) -> Result<Vec<PathBuf>> {
        let rule = &self.rules[task.rule];
        let declared = [Source::Path(task.input.clone())];

        match self.custodian.refresh_needed(&declared, &task.outputs)? {
            Freshness::Fresh => self.custodian.skip_step(&task.input, &task.outputs),
            Freshness::Stale(reason) => {
                let outcome = match rule.transform.as_deref() {
                    Some(transform) => {
                        transform.apply(&task.input, &task.outputs)
                            .map_err(|e| Error::transform(transform.name(), &task.input, e))?
                    }
                    None => None,
                };

                let (sources, outputs) = match outcome {
                    Some(Outcome { sources, outputs }) => (sources, outputs),
                    None => (declared.to_vec(), task.outputs.clone()),
                };

                self.custodian.add_step(&sources, &outputs, &reason)?;
                Ok(outputs)
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Process the input tree to fixpoint: every file deposited in the
    /// working directory is rescanned against the rules until a pass
    /// produces nothing new. Returns `false` when cancelled mid-build.
    pub fn process(&mut self) -> Result<bool> {
        let dirs = self.settings.dirs().clone();
        let mut queue = discover(&dirs.input, &[dirs.output.as_path(), dirs.working.as_path()])?;
        let mut produced: FxHashMap<(usize, PathBuf), u32> = FxHashMap::default();
        let mut failures: Vec<Error> = vec![];

        let mut passes = 0;
        while !queue.is_empty() {
            passes += 1;
            if passes > MAX_PASSES {
                return Err(Error::cycle(format!(
                    "working directory processing did not converge after {MAX_PASSES} passes",
                )));
            }

            queue.sort();
            let tasks = self.plan(&queue)?;
            queue = vec![];

            for task in tasks {
                if self.cancelled() {
                    self.log("build cancelled; finishing with current state");
                    return Ok(false);
                }

                let outputs = match self.execute(&task) {
                    Ok(outputs) => outputs,
                    Err(e) => match self.policy {
                        ErrorPolicy::Strict => return Err(e),
                        ErrorPolicy::Robust => {
                            failures.push(e);
                            continue;
                        }
                    },
                };

                if task.halt {
                    continue;
                }

                for output in outputs {
                    if !output.starts_with(&dirs.working) {
                        continue;
                    }

                    let count = produced.entry((task.rule, output.clone())).or_insert(0);
                    *count += 1;
                    if *count > LOOP_LIMIT {
                        return Err(Error::cycle(format!(
                            "rule {} keeps reproducing {}",
                            task.rule,
                            output.display(),
                        )));
                    }

                    queue.push(output);
                }
            }
        }

        match Error::batch(failures) {
            Some(error) => Err(error),
            None => Ok(true),
        }
    }

    /// Execute a complete build: optional purge, cache load, processing to
    /// fixpoint, orphan cleanup, cache save. Orphan cleanup is skipped on a
    /// cancelled build, because unprocessed outputs would look orphaned.
    pub fn run(&mut self) -> Result<()> {
        let dirs = self.settings.dirs().clone();
        if self.settings.purge_dirs() {
            remove_children(&dirs.output)?;
            remove_children(&dirs.working)?;
        }

        let cache = self.settings.custody_cache().map(Path::to_path_buf);
        if let Some(cache) = &cache {
            self.custodian.load(cache)?;
        }

        let completed = self.process()?;
        if completed {
            let removed = self.custodian.remove_orphans()?;
            if !removed.is_empty() {
                self.log(&format!("removed {} orphaned output(s)", removed.len()));
            }
        }

        if let Some(cache) = &cache {
            self.custodian.save(cache)?;
        }

        Ok(())
    }

    fn log(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }
}
