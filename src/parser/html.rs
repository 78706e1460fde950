//! HTML sanitization.
//!
//! Wikicode may embed HTML directly, restricted to a fixed allow-list of
//! tags. Anything else is literalized so it renders as text. Attributes not
//! on the allow-list are stripped.

use std::sync::LazyLock;

/// Flags for an allowed HTML tag.
#[derive(Clone, Copy, Debug)]
pub struct HtmlTag {
    /// Whether the element is block-level.
    #[allow(dead_code)]
    pub block: bool,
    /// Whether the element is void (has no end tag).
    pub void: bool,
}

/// Shorthand for the tag table below.
const fn tag(block: bool, void: bool) -> HtmlTag {
    HtmlTag { block, void }
}

/// The allowed plain HTML tags.
pub static HTML_TAGS: phf::Map<&'static str, HtmlTag> = phf::phf_map! {
    "a" => tag(false, false),
    "abbr" => tag(false, false),
    "address" => tag(false, false),
    "area" => tag(false, true),
    "aside" => tag(true, false),
    "b" => tag(false, false),
    "bdi" => tag(false, false),
    "bdo" => tag(false, false),
    "blockquote" => tag(true, false),
    "br" => tag(false, true),
    "caption" => tag(false, false),
    "cite" => tag(false, false),
    "code" => tag(false, false),
    "col" => tag(false, true),
    "colgroup" => tag(false, false),
    "data" => tag(false, false),
    "dd" => tag(true, false),
    "del" => tag(false, false),
    "details" => tag(true, false),
    "dfn" => tag(false, false),
    "div" => tag(true, false),
    "dl" => tag(true, false),
    "dt" => tag(true, false),
    "em" => tag(false, false),
    "hr" => tag(true, true),
    "i" => tag(false, false),
    "ins" => tag(false, false),
    "kbd" => tag(false, false),
    "label" => tag(false, false),
    "li" => tag(true, false),
    "map" => tag(false, false),
    "mark" => tag(false, false),
    "meter" => tag(false, false),
    "nav" => tag(false, false),
    "ol" => tag(false, false),
    "p" => tag(true, false),
    "pre" => tag(true, false),
    "progress" => tag(false, false),
    "q" => tag(false, false),
    "rp" => tag(false, false),
    "rt" => tag(false, false),
    "ruby" => tag(false, false),
    "s" => tag(false, false),
    "samp" => tag(false, false),
    "section" => tag(true, false),
    "small" => tag(false, false),
    "span" => tag(false, false),
    "strong" => tag(false, false),
    "sub" => tag(false, false),
    "summary" => tag(true, false),
    "table" => tag(true, false),
    "tbody" => tag(true, false),
    "td" => tag(true, false),
    "template" => tag(true, false),
    "tfoot" => tag(true, false),
    "th" => tag(true, false),
    "thead" => tag(true, false),
    "time" => tag(false, false),
    "tr" => tag(true, false),
    "u" => tag(false, false),
    "ul" => tag(true, false),
    "var" => tag(false, false),
    "wbr" => tag(false, true),
};

/// An attribute a custom tag declares.
#[derive(Clone, Copy, Debug)]
pub struct CustomAttribute {
    /// The attribute name.
    pub name: &'static str,
    /// Whether the tag is usable without it.
    pub optional: bool,
}

/// A custom (non-HTML) tag the wiki recognizes.
#[derive(Clone, Copy, Debug)]
pub struct CustomTag {
    /// Whether the element is block-level.
    #[allow(dead_code)]
    pub block: bool,
    /// Whether the element is void (has no end tag).
    pub void: bool,
    /// The attributes the tag accepts.
    pub attributes: &'static [CustomAttribute],
}

/// The custom tag set.
pub static CUSTOM_TAGS: phf::Map<&'static str, CustomTag> = phf::phf_map! {
    "gallery" => CustomTag {
        block: true,
        void: false,
        attributes: &[
            CustomAttribute { name: "mode", optional: true },
            CustomAttribute { name: "caption", optional: true },
            CustomAttribute { name: "widths", optional: true },
            CustomAttribute { name: "heights", optional: true },
            // Number of images per row
            CustomAttribute { name: "perrow", optional: true },
            CustomAttribute { name: "showthumbnails", optional: true },
        ],
    },
    "ref" => CustomTag {
        block: false,
        void: false,
        attributes: &[
            CustomAttribute { name: "name", optional: false },
            CustomAttribute { name: "group", optional: true },
        ],
    },
    "references" => CustomTag {
        block: true,
        void: true,
        attributes: &[
            CustomAttribute { name: "group", optional: true },
        ],
    },
};

/// Attributes allowed on any plain HTML tag.
static GLOBAL_ATTRIBUTES: phf::Set<&'static str> = phf::phf_set! {
    "accesskey", "class", "colspan", "datetime", "dir", "href", "id", "lang",
    "open", "rel", "reversed", "rowspan", "scope", "start", "style", "target",
    "title", "value",
};

/// Matches a complete start or end tag, quoted attribute values included.
static TAG_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:[^>"]|"[^"]*")*?)(/?)>"#).unwrap()
});

/// Matches one attribute inside a tag.
static ATTR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"([a-zA-Z][a-zA-Z0-9-]*)(?:\s*=\s*("[^"]*"|[^\s"]+))?"#).unwrap()
});

/// Matches a tag name with no complete tag around it.
static BARE_NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)").unwrap());

/// Sanitizes embedded HTML: literalizes `<` for unknown tags, strips unknown
/// attributes, and normalizes void elements to self-closing form.
pub fn sanitize(text: &str) -> String {
    let text = escape_stray_angle_brackets(text);

    let text = TAG_RE.replace_all(&text, |captures: &regex::Captures<'_>| {
        let closing = !captures[1].is_empty();
        let name = captures[2].to_ascii_lowercase();
        let attrs = &captures[3];

        if let Some(custom) = CUSTOM_TAGS.get(name.as_str()) {
            if closing {
                return format!("</{name}>");
            }
            let kept = filter_attributes(attrs, |attr| {
                custom.attributes.iter().any(|declared| declared.name == attr)
            });
            let missing_required = custom.attributes.iter().any(|declared| {
                !declared.optional
                    && !kept.iter().any(|(attr, _)| attr == declared.name)
            });
            if missing_required {
                return format!("&lt;{name}{attrs}&gt;");
            }
            render_tag(&name, &kept, custom.void)
        } else if let Some(html) = HTML_TAGS.get(name.as_str()) {
            if closing {
                return format!("</{name}>");
            }
            let kept = filter_attributes(attrs, |attr| {
                GLOBAL_ATTRIBUTES.contains(attr) || attr.starts_with("data-")
            });
            render_tag(&name, &kept, html.void)
        } else {
            let slash = if closing { "/" } else { "" };
            format!("&lt;{slash}{}{attrs}&gt;", &captures[2])
        }
    });

    // Tags that never completed (no '>') still get their names checked.
    BARE_NAME_RE
        .replace_all(&text, |captures: &regex::Captures<'_>| {
            let name = captures[2].to_ascii_lowercase();
            if HTML_TAGS.contains_key(name.as_str()) || CUSTOM_TAGS.contains_key(name.as_str()) {
                captures[0].to_string()
            } else {
                format!("&lt;{}{}", &captures[1], &captures[2])
            }
        })
        .into_owned()
}

/// Escapes `<` characters that do not start a tag name or a closer.
fn escape_stray_angle_brackets(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut flushed = 0;
    for index in memchr::memchr_iter(b'<', bytes) {
        let next = bytes.get(index + 1);
        if !next.is_some_and(|b| b.is_ascii_alphabetic() || *b == b'/') {
            out += &text[flushed..index];
            out += "&lt;";
            flushed = index + 1;
        }
    }
    out += &text[flushed..];
    out
}

/// Parses a tag’s attribute text and keeps the attributes `allowed` accepts.
fn filter_attributes(attrs: &str, allowed: impl Fn(&str) -> bool) -> Vec<(String, Option<String>)> {
    ATTR_RE
        .captures_iter(attrs)
        .filter_map(|captures| {
            let name = captures[1].to_ascii_lowercase();
            allowed(&name).then(|| {
                let value = captures.get(2).map(|value| {
                    let value = value.as_str();
                    value
                        .strip_prefix('"')
                        .and_then(|value| value.strip_suffix('"'))
                        .unwrap_or(value)
                        .to_string()
                });
                (name, value)
            })
        })
        .collect()
}

/// Renders a sanitized start tag.
fn render_tag(name: &str, attrs: &[(String, Option<String>)], void: bool) -> String {
    let mut out = format!("<{name}");
    for (attr, value) in attrs {
        match value {
            Some(value) => {
                out += &format!(" {attr}=\"{}\"", html_escape::encode_double_quoted_attribute(value));
            }
            None => out += &format!(" {attr}"),
        }
    }
    if void {
        out += "/";
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_literalized() {
        assert_eq!(sanitize("<script>x</script>"), "&lt;script&gt;x&lt;/script&gt;");
        assert_eq!(sanitize("a <blink>b"), "a &lt;blink&gt;b");
    }

    #[test]
    fn allowed_tags_survive() {
        assert_eq!(sanitize("<b>bold</b>"), "<b>bold</b>");
        assert_eq!(sanitize("<div class=\"x\">y</div>"), "<div class=\"x\">y</div>");
    }

    #[test]
    fn unknown_attributes_are_stripped() {
        assert_eq!(
            sanitize("<span onclick=\"evil()\" class=\"ok\">x</span>"),
            "<span class=\"ok\">x</span>"
        );
    }

    #[test]
    fn stray_angle_brackets_are_escaped() {
        assert_eq!(sanitize("1 < 2"), "1 &lt; 2");
        assert_eq!(sanitize("x <3"), "x &lt;3");
    }

    #[test]
    fn void_tags_self_close() {
        assert_eq!(sanitize("a<br>b"), "a<br/>b");
        assert_eq!(sanitize("<hr>"), "<hr/>");
    }

    #[test]
    fn custom_tags_keep_declared_attributes() {
        assert_eq!(
            sanitize("<ref name=\"a\" bogus=\"b\">text</ref>"),
            "<ref name=\"a\">text</ref>"
        );
        assert_eq!(sanitize("<references/>"), "<references/>");
    }

    #[test]
    fn custom_tags_missing_required_attributes_are_literalized() {
        assert_eq!(sanitize("<ref>floating</ref>"), "&lt;ref&gt;floating</ref>");
    }

    #[test]
    fn unterminated_unknown_tag_is_escaped() {
        assert_eq!(sanitize("oops <scrip"), "oops &lt;scrip");
    }
}
