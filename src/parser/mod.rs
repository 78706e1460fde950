//! The wikicode parser.
//!
//! Wikicode mixes HTML with three delimited constructs:
//!
//! * `{# … #}` — comment, discarded during parsing
//! * `{= name args… =}` — expression insertion: evaluates one magic variable
//!   or parser function and substitutes its string form
//! * `{% name args… %}` — template tag, standalone or paired with
//!   `{% end_name %}`
//!
//! Parsing runs in stages: template-tag expansion (the character scanner
//! below), HTML sanitization, wikilink rendering, and a final pass that
//! substitutes the placeholders `no_wiki` sections were stashed behind.
//!
//! The parser is resilient: malformed constructs render as inline error
//! spans and set the `template_tag_error` metadata flag rather than aborting
//! the parse. The one hard failure is the expansion ceiling: a parse whose
//! expanded text exceeds [`MAX_TEXT_LENGTH`] characters stops with
//! [`Error::TooLarge`].
//!
//! The parser holds no locks and only reads through the repository, so it is
//! re-entrant: transcluding one page while parsing another cannot deadlock.
//! A transclusion depth limit bounds cyclic transclusions.

pub mod functions;
pub mod html;
pub mod links;
pub mod magic;
pub mod tags;

use crate::{
    config,
    db::{Repository, models::{Page, PageCategory, PageLink, Revision, User}},
    title::Namespace,
};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::time::Instant;
use time::OffsetDateTime;

/// Maximum number of characters a parse may expand to.
pub const MAX_TEXT_LENGTH: usize = 10_000_000;

/// Maximum transclusion nesting depth.
pub const MAX_TRANSCLUSION_DEPTH: u32 = 8;

/// The CSS class of inline parse error markers.
pub const ERROR_CLASS: &str = "wiki-parser-error";

/// The hard parser failures.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The expanded text exceeded [`MAX_TEXT_LENGTH`].
    #[error("parsed text exceeds {MAX_TEXT_LENGTH} characters")]
    TooLarge,
}

/// Everything recorded about a parse besides the HTML itself.
#[derive(Clone, Debug)]
pub struct ParsingMetadata {
    /// Link targets touched during expansion.
    pub links: Vec<PageLink>,
    /// Categories the content places the page in.
    pub categories: Vec<PageCategory>,
    /// How long the parse took, in milliseconds.
    pub parse_duration_ms: u64,
    /// When the parse ran.
    pub parse_date: OffsetDateTime,
    /// UTF-8 size of the wikicode.
    pub size_before: usize,
    /// UTF-8 size of the rendered HTML.
    pub size_after: usize,
    /// Whether any construct failed to parse.
    pub template_tag_error: bool,
}

/// A finished parse.
#[derive(Clone, Debug)]
pub struct ParseOutput {
    /// The rendered HTML.
    pub html: String,
    /// Parse metadata.
    pub metadata: ParsingMetadata,
    /// The display title set by `DISPLAY_TITLE`, if any.
    pub display_title: Option<String>,
    /// The sort key set by `DEFAULT_SORT_KEY`, if any.
    pub default_sort_key: Option<String>,
}

/// The state threaded through one parse.
pub struct Context<'a> {
    /// Read-only access to the store, for transclusion and statistics.
    pub repo: &'a Repository,
    /// The page being parsed.
    pub page: Page,
    /// The revision being parsed, absent in preview contexts.
    pub revision: Option<Revision>,
    /// For pages in the User namespace, the account the page belongs to.
    pub user: Option<User>,
    /// The instant the parse observes as ‘now’.
    pub date: OffsetDateTime,
    /// The language the page content is written in.
    pub language: &'static config::Language,
    /// Whether the page is being expanded into another page.
    pub transcluding: bool,
    /// Current transclusion depth.
    pub depth: u32,
    /// The display title set by `DISPLAY_TITLE`.
    pub display_title: Option<String>,
    /// The sort key set by `DEFAULT_SORT_KEY`.
    pub default_sort_key: Option<String>,
    /// Next placeholder ordinal. Starts at a random index so stashed
    /// sections cannot collide with literal text from a previous parse.
    placeholder_index: u64,
    /// Stashed `no_wiki` sections, by placeholder.
    nowiki_placeholders: Vec<(String, String)>,
    /// Link targets recorded so far.
    links: Vec<PageLink>,
    /// Categories recorded so far.
    categories: Vec<PageCategory>,
    /// Characters appended across all expansion buffers.
    expanded: usize,
    /// Whether any construct failed to parse.
    template_tag_error: bool,
}

impl<'a> Context<'a> {
    /// Creates the context for one parse.
    pub fn new(
        repo: &'a Repository,
        page: Page,
        revision: Option<Revision>,
        date: OffsetDateTime,
    ) -> Self {
        let user = (page.namespace_id == Namespace::USER)
            .then(|| repo.user_by_name(page.base_name()))
            .flatten();
        let language = config::language(&page.content_language)
            .unwrap_or_else(config::default_language);
        let mut rng = SmallRng::from_os_rng();
        Self {
            repo,
            page,
            revision,
            user,
            date,
            language,
            transcluding: false,
            depth: 0,
            display_title: None,
            default_sort_key: None,
            placeholder_index: rng.random_range(1_000_000_000_000..10_000_000_000_000),
            nowiki_placeholders: Vec::new(),
            links: Vec::new(),
            categories: Vec::new(),
            expanded: 0,
            template_tag_error: false,
        }
    }

    /// Produces an inline error marker and latches the error flag.
    fn error(&mut self, message: &str) -> String {
        self.template_tag_error = true;
        format!(
            r#"<span class="{ERROR_CLASS}">{}</span>"#,
            html_escape::encode_text(message)
        )
    }

    /// Hands out the next placeholder ordinal.
    pub fn next_placeholder_index(&mut self) -> u64 {
        let index = self.placeholder_index;
        self.placeholder_index += 1;
        index
    }

    /// Stashes a literal section behind its placeholder.
    pub fn stash_nowiki(&mut self, placeholder: String, section: String) {
        self.nowiki_placeholders.push((placeholder, section));
    }

    /// Records a link target, once.
    pub fn record_link(&mut self, link: PageLink) {
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    /// Records a category membership, once per category title.
    pub fn record_category(&mut self, category: PageCategory) {
        if !self
            .categories
            .iter()
            .any(|existing| existing.cat_title == category.cat_title)
        {
            self.categories.push(category);
        }
    }

    /// Expands another page’s content into this parse.
    ///
    /// The target’s wikicode runs through template-tag expansion with
    /// `transcluding` set, so its `include_only` sections emit and its
    /// `no_include` sections do not.
    pub fn transclude(&mut self, raw_title: &str) -> Result<String, String> {
        if self.depth >= MAX_TRANSCLUSION_DEPTH {
            return Err("transclusion depth limit exceeded".to_string());
        }
        let canonical = crate::title::canonicalize(raw_title)
            .map_err(|err| format!("invalid title: {err}"))?;
        let (ns, name) = crate::title::split_title(&canonical);
        if name.is_empty() {
            return Err("invalid title: empty title".to_string());
        }
        if ns.id == Namespace::SPECIAL {
            return Err("special pages cannot be transcluded".to_string());
        }
        self.record_link(PageLink {
            namespace_id: ns.id,
            title: name.clone(),
        });
        let page = self.repo.get(ns, &name);
        if !page.exists {
            return Err(format!("page '{}' does not exist", page.full_title()));
        }
        let content = self.repo.content(ns.id, &name);

        let was_transcluding = self.transcluding;
        self.transcluding = true;
        self.depth += 1;
        let result = self.expand_tags(&content);
        self.transcluding = was_transcluding;
        self.depth -= 1;
        result.map_err(|err| err.to_string())
    }

    /// Substitutes `no_wiki` placeholders back, escaping angle brackets so
    /// the stashed text renders literally.
    fn substitute_nowiki(&self, mut text: String) -> String {
        for (placeholder, section) in &self.nowiki_placeholders {
            let escaped = section.replace('<', "&lt;").replace('>', "&gt;");
            text = text.replace(placeholder, &escaped);
        }
        text
    }

    /// Counts appended expansion output against the ceiling.
    fn charge(&mut self, characters: usize) -> Result<(), Error> {
        self.expanded += characters;
        if self.expanded > MAX_TEXT_LENGTH {
            return Err(Error::TooLarge);
        }
        Ok(())
    }
}

/// Scanner mode: which delimiter pair the scanner is currently inside.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// Plain text.
    Text,
    /// Inside `{# … #}`.
    Comment,
    /// Inside `{= … =}`.
    Expression,
    /// Inside `{% … %}`.
    Tag,
}

/// One frame of the tag parse stack.
struct Frame {
    /// Output accumulated at this nesting level.
    buffer: String,
    /// The paired tag that opened this frame, absent at the root.
    tag: Option<&'static tags::TemplateTag>,
    /// Whether delimiters other than the matching end tag are recognized.
    parse_section: bool,
}

/// A token of a tag or expression argument list.
#[derive(Debug, Eq, PartialEq)]
struct Token {
    /// The (unescaped) token text.
    text: String,
    /// Whether the token was written as a quoted string literal.
    quoted: bool,
}

/// Splits an argument string into whitespace-separated tokens. Double-quoted
/// literals may contain whitespace and the `\"` and `\\` escapes.
fn parse_arguments(raw: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped @ ('"' | '\\')) => text.push(escaped),
                        Some(other) => {
                            text.push('\\');
                            text.push(other);
                        }
                        None => return Err("unterminated string literal".to_string()),
                    },
                    Some('"') => break,
                    Some(other) => text.push(other),
                    None => return Err("unterminated string literal".to_string()),
                }
            }
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token { text, quoted: false });
        }
    }
    Ok(tokens)
}

impl Context<'_> {
    /// Runs the template-tag scanner over `code` and returns the expanded
    /// text.
    pub fn expand_tags(&mut self, code: &str) -> Result<String, Error> {
        let chars = code.chars().collect::<Vec<_>>();
        let mut i = 0;
        let mut mode = Mode::Text;
        let mut tag_buffer = String::new();
        let mut in_string = false;
        let mut backslashes = 0usize;
        let mut stack = vec![Frame {
            buffer: String::new(),
            tag: None,
            parse_section: true,
        }];

        let starts_with = |i: usize, open: char, close: char| {
            chars.get(i) == Some(&open) && chars.get(i + 1) == Some(&close)
        };

        while i < chars.len() {
            let c = chars[i];
            match mode {
                Mode::Text => {
                    let parse_section = stack
                        .last()
                        .is_none_or(|frame| frame.parse_section);
                    if parse_section && starts_with(i, '{', '#') {
                        mode = Mode::Comment;
                        tag_buffer.clear();
                        i += 2;
                    } else if parse_section && starts_with(i, '{', '=') {
                        mode = Mode::Expression;
                        tag_buffer.clear();
                        i += 2;
                    } else if starts_with(i, '{', '%') {
                        // Recognized even inside literal sections, so the
                        // matching end tag can be found.
                        mode = Mode::Tag;
                        tag_buffer.clear();
                        i += 2;
                    } else {
                        self.charge(1)?;
                        if let Some(frame) = stack.last_mut() {
                            frame.buffer.push(c);
                        }
                        i += 1;
                    }
                }
                Mode::Comment => {
                    if starts_with(i, '#', '}') {
                        tag_buffer.clear();
                        mode = Mode::Text;
                        i += 2;
                    } else {
                        tag_buffer.push(c);
                        i += 1;
                    }
                }
                Mode::Expression | Mode::Tag if in_string => {
                    if c == '\\' {
                        backslashes += 1;
                    } else {
                        if c == '"' && backslashes % 2 == 0 {
                            in_string = false;
                        }
                        backslashes = 0;
                    }
                    tag_buffer.push(c);
                    i += 1;
                }
                Mode::Expression => {
                    if c == '"' {
                        in_string = true;
                        backslashes = 0;
                        tag_buffer.push(c);
                        i += 1;
                    } else if starts_with(i, '=', '}') {
                        let expression = std::mem::take(&mut tag_buffer);
                        let result = self.evaluate_expression(&expression);
                        self.charge(result.chars().count())?;
                        if let Some(frame) = stack.last_mut() {
                            frame.buffer += &result;
                        }
                        tag_buffer.clear();
                        mode = Mode::Text;
                        i += 2;
                    } else {
                        tag_buffer.push(c);
                        i += 1;
                    }
                }
                Mode::Tag => {
                    if c == '"' {
                        in_string = true;
                        backslashes = 0;
                        tag_buffer.push(c);
                        i += 1;
                    } else if starts_with(i, '%', '}') {
                        let raw = std::mem::take(&mut tag_buffer);
                        self.handle_tag(&mut stack, &raw)?;
                        mode = Mode::Text;
                        i += 2;
                    } else {
                        tag_buffer.push(c);
                        i += 1;
                    }
                }
            }
        }

        // Constructs left open at the end of the input.
        match mode {
            Mode::Text => {}
            Mode::Comment => {
                // An unterminated comment reads as literal text.
                let restored = format!("{{#{tag_buffer}");
                self.charge(restored.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &restored;
                }
            }
            Mode::Expression => {
                let marker = self.error("unclosed expression");
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
            }
            Mode::Tag => {
                let marker = self.error("unclosed tag");
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
            }
        }

        // Sections left open flatten back into their parents.
        while stack.len() > 1 {
            let Some(frame) = stack.pop() else { break };
            let name = frame.tag.map_or("?", |tag| tag.name);
            let marker = self.error(&format!("missing end tag for '{name}'"));
            if let Some(parent) = stack.last_mut() {
                parent.buffer += &marker;
                parent.buffer += &frame.buffer;
            }
        }

        Ok(stack.pop().map(|frame| frame.buffer).unwrap_or_default())
    }

    /// Processes one complete `{% … %}` tag body.
    fn handle_tag(&mut self, stack: &mut Vec<Frame>, raw: &str) -> Result<(), Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            let marker = self.error("missing template tag name");
            self.charge(marker.chars().count())?;
            if let Some(frame) = stack.last_mut() {
                frame.buffer += &marker;
            }
            return Ok(());
        }

        let (head, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(head, rest)| (head, rest));
        let (is_end, name) = head
            .strip_prefix("end_")
            .map_or((false, head), |name| (true, name));

        // Inside a literal section only the section’s own tag is meaningful;
        // everything else passes through verbatim.
        let current = stack.last().and_then(|frame| frame.tag);
        let literal_section = stack.last().is_some_and(|frame| !frame.parse_section);
        if literal_section && current.is_none_or(|tag| tag.name != name) {
            let restored = format!("{{%{raw}%}}");
            self.charge(restored.chars().count())?;
            if let Some(frame) = stack.last_mut() {
                frame.buffer += &restored;
            }
            return Ok(());
        }

        let Some(tag) = tags::registry().get(name) else {
            let marker = if current.is_some_and(|tag| tag.intermediaries.contains(&name)) {
                // Intermediary tags re-evaluate the section gate.
                return self.handle_intermediary(stack, name, rest);
            } else {
                self.error(&format!("undefined template tag '{name}'"))
            };
            self.charge(marker.chars().count())?;
            if let Some(frame) = stack.last_mut() {
                frame.buffer += &marker;
            }
            return Ok(());
        };

        if is_end {
            let marker = if !rest.trim().is_empty() {
                Some(self.error("end tags do not take arguments"))
            } else if tag.standalone {
                Some(self.error(&format!("tag '{name}' should not have a closing tag")))
            } else if current.is_none_or(|open| open.name != name) {
                Some(self.error(&format!("stray end tag 'end_{name}'")))
            } else {
                None
            };
            if let Some(marker) = marker {
                self.charge(marker.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
                return Ok(());
            }
            if let Some(frame) = stack.pop() {
                let text = (tag.transform_section)(self, frame.buffer);
                self.charge(text.chars().count())?;
                if let Some(parent) = stack.last_mut() {
                    parent.buffer += &text;
                }
            }
            return Ok(());
        }

        let args = match parse_arguments(rest) {
            Ok(tokens) => tokens.into_iter().map(|token| token.text).collect::<Vec<_>>(),
            Err(message) => {
                let marker = self.error(&message);
                self.charge(marker.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
                return Ok(());
            }
        };

        match tag.call(self, &args) {
            Ok(tags::Outcome::Standalone(text)) => {
                self.charge(text.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &text;
                }
            }
            Ok(tags::Outcome::Section { parse }) => {
                stack.push(Frame {
                    buffer: String::new(),
                    tag: Some(tag),
                    parse_section: parse,
                });
            }
            Err(message) => {
                let marker = self.error(&message);
                self.charge(marker.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
            }
        }
        Ok(())
    }

    /// Re-evaluates the current section gate for an intermediary tag.
    fn handle_intermediary(
        &mut self,
        stack: &mut Vec<Frame>,
        name: &str,
        rest: &str,
    ) -> Result<(), Error> {
        let Some(tag) = stack.last().and_then(|frame| frame.tag) else {
            return Ok(());
        };
        let args = match parse_arguments(rest) {
            Ok(tokens) => tokens.into_iter().map(|token| token.text).collect::<Vec<_>>(),
            Err(message) => {
                let marker = self.error(&message);
                self.charge(marker.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
                return Ok(());
            }
        };
        match tag.call(self, &args) {
            Ok(tags::Outcome::Section { parse }) => {
                if let Some(frame) = stack.last_mut() {
                    frame.parse_section = parse;
                }
            }
            Ok(tags::Outcome::Standalone(text)) => {
                self.charge(text.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &text;
                }
            }
            Err(message) => {
                let marker = self.error(&format!("{name}: {message}"));
                self.charge(marker.chars().count())?;
                if let Some(frame) = stack.last_mut() {
                    frame.buffer += &marker;
                }
            }
        }
        Ok(())
    }

    /// Evaluates one `{= … =}` expression insertion.
    ///
    /// The head token names a magic variable or a parser function; the
    /// remaining tokens are its arguments. A lone string literal evaluates
    /// to itself.
    fn evaluate_expression(&mut self, raw: &str) -> String {
        let tokens = match parse_arguments(raw.trim()) {
            Ok(tokens) => tokens,
            Err(message) => return self.error(&message),
        };
        let Some(head) = tokens.first() else {
            return self.error("missing expression");
        };

        if !head.quoted {
            let args = tokens[1..]
                .iter()
                .map(|token| token.text.clone())
                .collect::<Vec<_>>();
            if let Some(variable) = magic::registry().get(head.text.as_str()) {
                return variable
                    .call(self, &args)
                    .unwrap_or_else(|message| self.error(&message));
            }
            if let Some(function) = functions::registry().get(head.text.as_str()) {
                return function
                    .call(self, &args)
                    .unwrap_or_else(|message| self.error(&message));
            }
        } else if tokens.len() == 1 {
            return head.text.clone();
        }

        self.error(&format!(
            "undefined magic variable or parser function '{}'",
            head.text
        ))
    }
}

/// Parses wikicode in the context of a page and optional revision.
pub fn parse(
    repo: &Repository,
    page: &Page,
    revision: Option<&Revision>,
    content: &str,
    now: OffsetDateTime,
) -> Result<ParseOutput, Error> {
    let start = Instant::now();
    let mut ctx = Context::new(repo, page.clone(), revision.cloned(), now);
    let size_before = content.len();

    let expanded = ctx.expand_tags(content)?;
    let sanitized = html::sanitize(&expanded);
    let linked = links::render_wikilinks(&mut ctx, &sanitized);
    let rendered = ctx.substitute_nowiki(linked);

    // Clippy: a parse will not run for 585 million years.
    #[allow(clippy::cast_possible_truncation)]
    let parse_duration_ms = start.elapsed().as_millis() as u64;
    let metadata = ParsingMetadata {
        links: ctx.links.clone(),
        categories: ctx.categories.clone(),
        parse_duration_ms,
        parse_date: now,
        size_before,
        size_after: rendered.len(),
        template_tag_error: ctx.template_tag_error,
    };
    Ok(ParseOutput {
        html: rendered,
        metadata,
        display_title: ctx.display_title,
        default_sort_key: ctx.default_sort_key,
    })
}

/// Parses content only to recover its link and category indexes.
///
/// Used by the edit path to refresh the derived tables; an over-large parse
/// yields empty indexes rather than failing the edit.
pub fn extract_metadata(
    repo: &Repository,
    page: &Page,
    content: &str,
    now: OffsetDateTime,
) -> (Vec<PageLink>, Vec<PageCategory>) {
    match parse(repo, page, None, content, now) {
        Ok(output) => (output.metadata.links, output.metadata.categories),
        Err(_) => (Vec::new(), Vec::new()),
    }
}

#[cfg(test)]
mod tests;
