//! Internal and external link rendering.
//!
//! `[[Target]]` and `[[Target|text]]` in page content become anchors;
//! `[[Category:Name]]` and `[[Category:Name|sort key]]` attach the page to a
//! category and render nothing. Links to missing pages are marked with the
//! `wiki-red-link` class; a link from a page to itself renders as bold text
//! instead of an anchor.

use super::Context;
use crate::{
    config,
    db::{Repository, models::{PageCategory, PageLink}},
    title::{self, Namespace},
};
use std::fmt::Write as _;

/// Options for [`format_internal_link`].
#[derive(Debug, Default)]
pub struct LinkOptions<'a> {
    /// Text of the link. Defaults to the target’s full title.
    pub text: Option<&'a str>,
    /// Tooltip of the link. Defaults to the target’s full title.
    pub tooltip: Option<&'a str>,
    /// Fragment to append to the URL.
    pub anchor: Option<&'a str>,
    /// Extra query parameters, rendered in order.
    pub url_params: Vec<(&'a str, &'a str)>,
    /// Extra CSS classes.
    pub css_classes: Vec<&'a str>,
    /// The `id` attribute, if any.
    pub id: Option<&'a str>,
    /// The `accesskey` attribute, if any.
    pub access_key: Option<&'a str>,
    /// Full title of the page the link appears on, for self-link detection.
    pub current_page_title: Option<&'a str>,
    /// Suppress the red-link styling for missing targets.
    pub no_red_link: bool,
    /// Return only the URL instead of a full anchor.
    pub only_url: bool,
    /// Open in a new tab, with a visual indicator.
    pub external: bool,
}

/// Renders a link to a wiki page.
pub fn format_internal_link(repo: &Repository, page_title: &str, options: &LinkOptions<'_>) -> String {
    let (ns, name) = title::split_title(page_title);
    let page = repo.get(ns, &name);
    let full_title = page.full_title();

    let link_text = options.text.unwrap_or(&full_title);

    // A page linking to itself, with nothing to distinguish the target from
    // the current view, renders as plain bold text.
    if options.current_page_title == Some(full_title.as_str())
        && options.anchor.is_none()
        && options.url_params.is_empty()
    {
        return if options.only_url {
            String::new()
        } else {
            format!(r#"<strong class="wiki-recursive-link">{link_text}</strong>"#)
        };
    }

    let mut url = format!("{}/{}", config::WIKI_PATH, title::url_encode(&full_title));
    let mut tooltip = options.tooltip.unwrap_or(&full_title).to_string();

    let action = options
        .url_params
        .iter()
        .find(|(name, _)| *name == "action")
        .map(|(_, value)| *value);
    let target_renders = page.exists
        || options.no_red_link
        || matches!(action, Some("talk" | "info" | "history" | "raw"));

    if target_renders {
        let mut first = true;
        for (name, value) in &options.url_params {
            let sep = if first { '?' } else { '&' };
            first = false;
            let _ = write!(
                url,
                "{sep}{}={}",
                crate::parser::functions::query_encode(name),
                crate::parser::functions::query_encode(value)
            );
        }
        if let Some(anchor) = options.anchor {
            let _ = write!(url, "#{anchor}");
        }
    } else {
        if ns.id != Namespace::SPECIAL {
            url += "?action=edit&red_link=1";
        }
        tooltip += " (page does not exist)";
    }

    if options.only_url {
        return url;
    }
    format_link(
        &url,
        link_text,
        &tooltip,
        page.exists,
        &options.css_classes,
        options.id,
        options.access_key,
        options.external,
        &[],
    )
}

/// Renders an anchor element.
///
/// Boolean `data-*` attributes serialize as `0`/`1`.
#[allow(clippy::too_many_arguments)]
pub fn format_link(
    url: &str,
    text: &str,
    tooltip: &str,
    page_exists: bool,
    css_classes: &[&str],
    id: Option<&str>,
    access_key: Option<&str>,
    external: bool,
    data_attributes: &[(&str, bool)],
) -> String {
    let mut classes = css_classes.to_vec();
    if !page_exists {
        classes.push("wiki-red-link");
    }

    let disabled = classes.contains(&"disabled");
    let url = if disabled { "" } else { url };

    let mut text = text.to_string();
    let mut out = String::from("<a");
    if disabled {
        out += r#" aria-disabled="true""#;
    }
    if let Some(access_key) = access_key {
        let _ = write!(out, r#" accesskey="{access_key}""#);
    }
    if external {
        text += r#" <span class="wiki-external-link-icon"></span>"#;
        out += r#" target="_blank""#;
    }
    for (name, value) in data_attributes {
        let _ = write!(out, r#" data-{name}="{}""#, u8::from(*value));
    }
    if let Some(id) = id {
        let _ = write!(out, r#" id="{id}""#);
    }
    let _ = write!(
        out,
        r#" href="{url}" class="{}" title="{}">{text}</a>"#,
        classes.join(" "),
        html_escape::encode_double_quoted_attribute(tooltip),
    );
    out
}

/// Expands `[[…]]` constructs, recording links and categories into the
/// context as it goes.
pub fn render_wikilinks(ctx: &mut Context<'_>, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        let Some(end) = rest[start + 2..].find("]]") else {
            break;
        };
        out += &rest[..start];
        let inner = &rest[start + 2..start + 2 + end];
        rest = &rest[start + 2 + end + 2..];

        let (target, label) = inner
            .split_once('|')
            .map_or((inner, None), |(target, label)| (target, Some(label)));
        let (target, anchor) = target
            .split_once('#')
            .map_or((target, None), |(target, anchor)| (target, Some(anchor)));

        let Ok(canonical) = title::canonicalize(target) else {
            // Not a valid target, keep the construct as written.
            let _ = write!(out, "[[{inner}]]");
            continue;
        };
        let (ns, name) = title::split_title(&canonical);
        if name.is_empty() {
            let _ = write!(out, "[[{inner}]]");
            continue;
        }

        if ns.id == Namespace::CATEGORY && anchor.is_none() {
            ctx.record_category(PageCategory {
                cat_title: name,
                sort_key: label.map(|label| label.trim().to_string()),
            });
            continue;
        }

        ctx.record_link(PageLink {
            namespace_id: ns.id,
            title: name.clone(),
        });
        let current = ctx.page.full_title();
        out += &format_internal_link(
            ctx.repo,
            &ns.full_title(&name),
            &LinkOptions {
                text: label.map(str::trim),
                anchor,
                current_page_title: Some(&current),
                ..LinkOptions::default()
            },
        );
    }

    out += rest;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;

    #[test]
    fn missing_target_is_a_red_link() {
        let repo = Repository::new();
        let html = format_internal_link(&repo, "No Such Page", &LinkOptions::default());
        assert!(html.contains("wiki-red-link"), "{html}");
        assert!(html.contains("action=edit&red_link=1"), "{html}");
        assert!(html.contains("(page does not exist)"), "{html}");
    }

    #[test]
    fn self_link_is_bold_text() {
        let repo = Repository::new();
        let html = format_internal_link(
            &repo,
            "Loop",
            &LinkOptions {
                current_page_title: Some("Loop"),
                ..LinkOptions::default()
            },
        );
        assert_eq!(html, r#"<strong class="wiki-recursive-link">Loop</strong>"#);
    }

    #[test]
    fn anchor_defeats_self_link_detection() {
        let repo = Repository::new();
        let html = format_internal_link(
            &repo,
            "Loop",
            &LinkOptions {
                current_page_title: Some("Loop"),
                anchor: Some("section"),
                ..LinkOptions::default()
            },
        );
        assert!(html.starts_with("<a"), "{html}");
    }

    #[test]
    fn external_links_open_in_new_tab() {
        let html = format_link("https://example.com", "x", "x", true, &[], None, None, true, &[]);
        assert!(html.contains(r#"target="_blank""#));
        assert!(html.contains("wiki-external-link-icon"));
    }

    #[test]
    fn data_attributes_serialize_booleans() {
        let html = format_link("/wiki/X", "x", "x", true, &[], None, None, false, &[("minor", true), ("bot", false)]);
        assert!(html.contains(r#"data-minor="1""#));
        assert!(html.contains(r#"data-bot="0""#));
    }

    #[test]
    fn disabled_links_lose_their_target() {
        let html = format_link("/wiki/X", "x", "x", true, &["disabled"], None, None, false, &[]);
        assert!(html.contains(r#"aria-disabled="true""#));
        assert!(html.contains(r#"href="""#));
    }
}
