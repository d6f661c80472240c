use bowerbird::error::Result;
use bowerbird::{CalcSlot, ContextDir, DirCalc, Matcher, RegexMatcher, Rule, WebIndexCalc};
use bowerbird::transforms::CopyTransform;

use crate::config::CONFIG_FILE;
use crate::markdown::MarkdownTransform;

/// The built-in ruleset: drop hidden files and our own configuration,
/// render markdown into the working directory, publish HTML under pretty
/// index paths, and copy everything else through untouched.
pub fn rules() -> Result<Vec<Rule>> {
    let html_anywhere = Matcher::from(
        RegexMatcher::new(r".*\.html")?.under(ContextDir::Input),
    ) | Matcher::from(
        RegexMatcher::new(r".*\.html")?.under(ContextDir::Working),
    );

    Ok(vec![
        // Dotfiles in any directory, and editor droppings.
        Rule::drop(Matcher::regex(r"(.*/)?\..*")?),
        Rule::drop(Matcher::regex(r"(.*/)?.*~")?),
        Rule::drop(Matcher::regex(&regex_escape(CONFIG_FILE))?),

        Rule::new(
            Matcher::regex(r".*\.(md|markdown)")?,
            [CalcSlot::from(DirCalc::working().ext(".html"))],
            MarkdownTransform::new(),
        ),

        // Rendered or hand-written HTML lands under foo/index.html so URLs
        // need no extension. The stop keeps published pages from cycling
        // back through the rules.
        Rule::new(
            html_anywhere,
            [
                CalcSlot::from(WebIndexCalc::new(ContextDir::Output)),
                CalcSlot::Stop,
            ],
            CopyTransform,
        ),

        Rule::new(
            Matcher::regex(r".*")?,
            [CalcSlot::from(DirCalc::output())],
            CopyTransform,
        ),
    ])
}

fn regex_escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if !c.is_ascii_alphanumeric() {
            out.push('\\');
        }

        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bowerbird::{Context, Settings};

    use super::*;

    #[test]
    fn end_to_end_site_build() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("site");
        fs::create_dir_all(input.join("posts")).unwrap();
        fs::write(input.join("posts/hello.md"), "# Hello\n").unwrap();
        fs::write(input.join("style.css"), "body { margin: 0 }").unwrap();
        fs::write(input.join(".DS_Store"), "junk").unwrap();
        fs::write(input.join("pipeline.toml"), "[build]\n").unwrap();

        let settings = Settings::builder(&input)
            .output(tmp.path().join("public"))
            .working(tmp.path().join("work"))
            .custody_cache(tmp.path().join("custody.json"))
            .build()
            .unwrap();

        let mut context = Context::new(settings, rules().unwrap())
            .unwrap()
            .quiet(true);
        context.run().unwrap();

        let public = tmp.path().join("public");
        let page = fs::read_to_string(public.join("posts/hello/index.html")).unwrap();
        assert!(page.contains("<h1>Hello</h1>"));
        assert!(public.join("style.css").exists());
        assert!(!public.join(".DS_Store").exists());
        assert!(!public.join("pipeline.toml").exists());
    }
}
