mod matcher;
mod pathcalc;
mod transform;

pub use matcher::*;
pub use pathcalc::*;
pub use transform::*;

/// One element of a rule's path-calculator sequence: a calculator, or the
/// stop sentinel.
pub enum CalcSlot {
    Calc(PathCalc),
    /// Outputs computed by the preceding calculators are not re-enqueued
    /// even when they land in the working directory. A rule whose sequence
    /// is empty or starts with `Stop` is a drop rule.
    Stop,
}

impl From<PathCalc> for CalcSlot {
    fn from(calc: PathCalc) -> Self {
        CalcSlot::Calc(calc)
    }
}

impl From<DirCalc> for CalcSlot {
    fn from(calc: DirCalc) -> Self {
        CalcSlot::Calc(calc.into())
    }
}

impl From<WebIndexCalc> for CalcSlot {
    fn from(calc: WebIndexCalc) -> Self {
        CalcSlot::Calc(calc.into())
    }
}

impl From<std::path::PathBuf> for CalcSlot {
    fn from(path: std::path::PathBuf) -> Self {
        CalcSlot::Calc(path.into())
    }
}

/// One declarative pipeline step: a matcher deciding which files the rule
/// handles, calculators producing the output paths, and an optional
/// transform. Rules are immutable once the engine is built, and the first
/// matching rule handles a file exclusively.
pub struct Rule {
    pub(crate) matcher: Matcher,
    pub(crate) calcs: Vec<PathCalc>,
    pub(crate) halt: bool,
    pub(crate) transform: Option<Box<dyn Transform>>,
}

impl Rule {
    pub fn new<I, T>(matcher: Matcher, calcs: I, transform: T) -> Rule
        where I: IntoIterator<Item = CalcSlot>, T: Transform + 'static
    {
        Rule::build(matcher, calcs, Some(Box::new(transform)))
    }

    /// A rule with calculators but no transform: the computed outputs are
    /// adopted into the custody graph as-is. They must already exist, which
    /// is how artifacts placed by an external collaborator are made known to
    /// the engine.
    pub fn adopt<I>(matcher: Matcher, calcs: I) -> Rule
        where I: IntoIterator<Item = CalcSlot>
    {
        Rule::build(matcher, calcs, None)
    }

    /// A drop rule: matching files are handled and produce nothing.
    pub fn drop(matcher: Matcher) -> Rule {
        Rule::build(matcher, [], None)
    }

    fn build<I>(matcher: Matcher, calcs: I, transform: Option<Box<dyn Transform>>) -> Rule
        where I: IntoIterator<Item = CalcSlot>
    {
        // The sequence is truncated at the first stop sentinel; a rule with
        // any stop never re-enqueues its outputs.
        let mut halt = false;
        let mut kept = vec![];
        for slot in calcs {
            match slot {
                CalcSlot::Calc(calc) => kept.push(calc),
                CalcSlot::Stop => {
                    halt = true;
                    break;
                }
            }
        }

        if kept.is_empty() {
            halt = true;
        }

        Rule { matcher, calcs: kept, halt, transform }
    }

    /// Whether this rule matches files without producing outputs.
    pub fn is_drop(&self) -> bool {
        self.calcs.is_empty()
    }

    pub fn halts(&self) -> bool {
        self.halt
    }

    pub fn transform_name(&self) -> Option<&str> {
        self.transform.as_deref().map(Transform::name)
    }
}
