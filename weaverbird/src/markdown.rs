use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::{html, Options, Parser};

use bowerbird::error::{Error, Result};
use bowerbird::transforms::{duplicate_first_output, ensure_output_dirs};
use bowerbird::{Outcome, Transform};

/// Renders CommonMark into bare HTML. Layout is left to downstream rules;
/// this stage only converts text.
pub struct MarkdownTransform {
    options: Options,
}

impl MarkdownTransform {
    pub fn new() -> Self {
        MarkdownTransform {
            options: Options::all().difference(Options::ENABLE_SMART_PUNCTUATION),
        }
    }
}

impl Default for MarkdownTransform {
    fn default() -> Self {
        MarkdownTransform::new()
    }
}

impl Transform for MarkdownTransform {
    fn name(&self) -> &str {
        "markdown"
    }

    fn apply(&self, input: &Path, outputs: &[PathBuf]) -> Result<Option<Outcome>> {
        let text = fs::read_to_string(input)
            .map_err(|source| Error::io("read", input, source))?;

        let mut rendered = String::with_capacity(text.len() * 2);
        html::push_html(&mut rendered, Parser::new_ext(&text, self.options));

        ensure_output_dirs(outputs)?;
        if let Some(first) = outputs.first() {
            fs::write(first, &rendered)
                .map_err(|source| Error::io("write", first, source))?;
        }

        duplicate_first_output(outputs)?;
        Ok(None)
    }
}
