//! Template tag implementations and their registry.
//!
//! Template tags are the `{% name %}` constructs. Standalone tags expand in
//! place; paired tags open a section that is closed by `{% end_name %}` and
//! transformed as a whole. A paired tag whose `evaluate` returns
//! `Section { parse: false }` suppresses all delimiter recognition inside the
//! section except its own end tag.

use super::Context;
use std::{collections::HashMap, sync::LazyLock};

/// What evaluating an opening tag does to the parse.
#[derive(Debug)]
pub enum Outcome {
    /// The tag is standalone and expands to this text.
    Standalone(String),
    /// The tag opens a section; `parse` controls whether the section’s
    /// contents are scanned for further constructs.
    Section {
        /// Whether to keep parsing inside the section.
        parse: bool,
    },
}

/// A template tag definition.
pub struct TemplateTag {
    /// The tag name, as written between `{%` and `%}`.
    pub name: &'static str,
    /// Whether the tag is standalone (takes no end tag).
    pub standalone: bool,
    /// Minimum number of arguments.
    pub min_args: usize,
    /// Maximum number of arguments.
    pub max_args: usize,
    /// Names of intermediary tags permitted between the open and end tags.
    pub intermediaries: &'static [&'static str],
    /// Evaluates the opening (or intermediary) tag.
    pub evaluate: fn(&mut Context<'_>, &[String]) -> Result<Outcome, String>,
    /// Transforms the accumulated section when the end tag is reached.
    pub transform_section: fn(&mut Context<'_>, String) -> String,
}

impl TemplateTag {
    /// Runs the arity check, then the tag’s own evaluation.
    pub fn call(&self, ctx: &mut Context<'_>, args: &[String]) -> Result<Outcome, String> {
        if args.len() < self.min_args || args.len() > self.max_args {
            return Err(format!(
                "tag '{}' expects between {} and {} argument(s), got {}",
                self.name,
                self.min_args,
                self.max_args,
                args.len()
            ));
        }
        (self.evaluate)(ctx, args)
    }
}

impl core::fmt::Debug for TemplateTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TemplateTag")
            .field("name", &self.name)
            .field("standalone", &self.standalone)
            .finish_non_exhaustive()
    }
}

/// The tag registry, keyed by name. Built once at start-up.
pub fn registry() -> &'static HashMap<&'static str, TemplateTag> {
    static REGISTRY: LazyLock<HashMap<&'static str, TemplateTag>> = LazyLock::new(|| {
        let tags = [
            TemplateTag {
                name: "no_wiki",
                standalone: false,
                min_args: 0,
                max_args: 0,
                intermediaries: &[],
                evaluate: |_, _| Ok(Outcome::Section { parse: false }),
                transform_section: stash_literal_section,
            },
            TemplateTag {
                name: "include_only",
                standalone: false,
                min_args: 0,
                max_args: 0,
                intermediaries: &[],
                evaluate: |ctx, _| Ok(Outcome::Section {
                    parse: ctx.transcluding,
                }),
                transform_section: |ctx, section| {
                    if ctx.transcluding { section } else { String::new() }
                },
            },
            TemplateTag {
                name: "no_include",
                standalone: false,
                min_args: 0,
                max_args: 0,
                intermediaries: &[],
                evaluate: |ctx, _| Ok(Outcome::Section {
                    parse: !ctx.transcluding,
                }),
                transform_section: |ctx, section| {
                    if ctx.transcluding { String::new() } else { section }
                },
            },
            TemplateTag {
                name: "include",
                standalone: true,
                min_args: 1,
                max_args: 1,
                intermediaries: &[],
                evaluate: |ctx, args| ctx.transclude(&args[0]).map(Outcome::Standalone),
                transform_section: |_, section| section,
            },
        ];
        tags.into_iter().map(|tag| (tag.name, tag)).collect()
    });
    &REGISTRY
}

/// Replaces a literal section with a fresh placeholder; the placeholder is
/// substituted back (escaped) by the parser’s final pass.
fn stash_literal_section(ctx: &mut Context<'_>, section: String) -> String {
    let placeholder = format!("`$:!PLACEHOLDER-nowiki-{}!:$`", ctx.next_placeholder_index());
    ctx.stash_nowiki(placeholder.clone(), section);
    placeholder
}
