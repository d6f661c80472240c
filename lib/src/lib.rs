//! A rule-driven file processing pipeline with chain-of-custody rebuilds.
//!
//! # Overview
//!
//! Bowerbird turns a declarative list of [`Rule`]s into a build: files are
//! discovered in an input tree, each is claimed by the first rule whose
//! matcher accepts it, and the rule's path calculators and transform decide
//! where its outputs land. Files deposited in the _working_ directory are
//! fed back through the rules until nothing new appears; final artifacts
//! land in the _output_ directory.
//!
//! Nothing here knows about HTML or any other format. Transforms are opaque
//! file-to-file functions; bowerbird's contribution is orchestration plus a
//! persistent _custody_ record of which sources produced which outputs. On
//! a rebuild that record lets the engine prove most transforms unnecessary:
//!
//! 1. Content hashes (with an mtime/size short-circuit) establish whether
//!    each recorded upstream still matches reality.
//! 2. Hidden dependencies a transform declared (templates, glob manifests,
//!    fetched URLs) are checked through an open per-kind registry.
//! 3. Outputs someone modified behind the engine's back are re-made, and
//!    outputs whose sources vanished are deleted as orphans.
//!
//! The engine is deliberately single-threaded: transforms run one at a
//! time, in a deterministic order, so custody needs no locking and builds
//! are reproducible run to run.
//!
//! ```no_run
//! use bowerbird::{Context, Rule, Settings};
//! use bowerbird::{CalcSlot, DirCalc, Matcher};
//! use bowerbird::transforms::CopyTransform;
//!
//! # fn main() -> bowerbird::error::Result<()> {
//! let settings = Settings::builder("site")
//!     .output("public")
//!     .custody_cache("site.custody.json")
//!     .build()?;
//!
//! let rules = vec![
//!     Rule::drop(Matcher::regex(r"\..*")?),
//!     Rule::new(
//!         Matcher::regex(r".*")?,
//!         [CalcSlot::from(DirCalc::output())],
//!         CopyTransform,
//!     ),
//! ];
//!
//! Context::new(settings, rules)?.run()
//! # }
//! ```

pub mod error;
pub mod util;
pub mod checksum;
pub mod settings;
pub mod discover;
pub mod custody;
pub mod rule;
pub mod transforms;
pub mod context;

pub use settings::{ContextDir, Dirs, Settings};
pub use custody::{Custodian, CustodyEntry, Freshness, Source};
pub use rule::{CalcSlot, DirCalc, FnTransform, Matcher, Outcome, PathCalc, RegexMatcher, Rule,
    Transform, WebIndexCalc, Witness};
pub use context::{Context, ErrorPolicy, Task};
