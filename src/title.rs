//! Types and functions for parsing and formatting wiki page titles.
//!
//! A full title is `<namespace>:<title>`, except in the main namespace where
//! it is the bare title. Titles are canonicalized before use: URL-decoded,
//! underscores converted to spaces, surrounding whitespace trimmed.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{borrow::Cow, sync::LazyLock};

/// The separator between a namespace name and the page title.
pub const SEPARATOR: char = ':';

/// A page namespace.
///
/// Namespaces form a closed set: pages in different namespaces have different
/// edit and subpage policies depending on the namespace’s configuration.
#[derive(Debug, Eq)]
pub struct Namespace {
    /// The namespace ID.
    pub id: i32,
    /// The canonical name of the namespace. Empty for the main namespace.
    pub name: &'static str,
    /// Alternative names accepted when resolving titles.
    pub aliases: &'static [&'static str],
    /// Whether pages within this namespace are the wiki’s ‘main’ content.
    pub is_content: bool,
    /// Whether the namespace supports subpages.
    pub allows_subpages: bool,
    /// Whether pages in this namespace can be edited at all.
    pub is_editable: bool,
    /// Permissions a user must hold to edit pages in this namespace.
    pub required_perms: &'static [&'static str],
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Namespace {
    /// The namespace ID used for dynamic pages.
    pub const SPECIAL: i32 = -1;
    /// The main namespace ID.
    pub const MAIN: i32 = 0;
    /// The category namespace ID.
    pub const CATEGORY: i32 = 1;
    /// The project namespace ID.
    pub const WIKI: i32 = 2;
    /// The help namespace ID.
    pub const HELP: i32 = 3;
    /// The user namespace ID.
    pub const USER: i32 = 4;
    /// The template namespace ID.
    pub const TEMPLATE: i32 = 10;
    /// The module namespace ID.
    pub const MODULE: i32 = 11;
    /// The interface namespace ID.
    pub const INTERFACE: i32 = 12;
    /// The file namespace ID.
    pub const FILE: i32 = 13;

    /// Returns all namespaces for this installation.
    pub fn all() -> &'static [Self] {
        NAMESPACES
    }

    /// Finds the namespace with the given numeric ID.
    pub fn find_by_id(id: i32) -> Option<&'static Self> {
        NAMESPACES.iter().find(|ns| ns.id == id)
    }

    /// Finds the namespace with the given case-insensitive name. Searches the
    /// name and all aliases.
    pub fn find_by_name(name: &str) -> Option<&'static Self> {
        NAMESPACES.iter().find(|ns| {
            ns.name.eq_ignore_ascii_case(name)
                || ns.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
        })
    }

    /// Returns the main namespace.
    pub fn main() -> &'static Self {
        Namespace::find_by_id(Namespace::MAIN).unwrap()
    }

    /// Returns the full version of the given page title in this namespace,
    /// in the format `<name>:<title>` (or the bare title for Main).
    pub fn full_title(&self, title: &str) -> String {
        if self.name.is_empty() {
            title.to_string()
        } else {
            format!("{}{SEPARATOR}{title}", self.name)
        }
    }

    /// Checks whether the given user holds every permission required to edit
    /// pages in this namespace.
    pub fn can_user_edit_pages(&self, user: &crate::db::models::User) -> bool {
        self.is_editable && self.required_perms.iter().all(|p| user.has_permission(p))
    }
}

/// The closed set of namespaces.
static NAMESPACES: &[Namespace] = &[
    Namespace {
        id: Namespace::SPECIAL,
        name: "Special",
        aliases: &[],
        is_content: false,
        allows_subpages: false,
        is_editable: false,
        required_perms: &[],
    },
    Namespace {
        id: Namespace::MAIN,
        name: "",
        aliases: &[],
        is_content: true,
        allows_subpages: false,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::CATEGORY,
        name: "Category",
        aliases: &["Cat"],
        is_content: false,
        allows_subpages: false,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::WIKI,
        name: "Wiki",
        aliases: &["Project"],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::HELP,
        name: "Help",
        aliases: &[],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::USER,
        name: "User",
        aliases: &[],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::TEMPLATE,
        name: "Template",
        aliases: &["T"],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::MODULE,
        name: "Module",
        aliases: &[],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
    Namespace {
        id: Namespace::INTERFACE,
        name: "Interface",
        aliases: &[],
        is_content: false,
        allows_subpages: true,
        is_editable: true,
        required_perms: &[
            crate::auth::perms::WIKI_EDIT,
            crate::auth::perms::WIKI_EDIT_INTERFACE,
        ],
    },
    Namespace {
        id: Namespace::FILE,
        name: "File",
        aliases: &["Image"],
        is_content: false,
        allows_subpages: false,
        is_editable: true,
        required_perms: &[crate::auth::perms::WIKI_EDIT],
    },
];

/// Errors produced when resolving a raw title.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TitleError {
    /// The title contains no text (after the namespace prefix, if any).
    #[error("empty title")]
    Empty,
    /// The title contains a character that titles may never contain.
    #[error("invalid character {0:?} in title")]
    BadChar(char),
}

/// Matches HTML entity look-alikes, which are rejected in titles so that a
/// title round-trips unambiguously through HTML.
static ENTITY_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"&#?[a-zA-Z0-9]+;").unwrap());

/// Returns true if `c` may never appear in a canonical title.
fn invalid_title_char(c: char) -> bool {
    matches!(
        c,
        '%' | '@' | '<' | '>' | '_' | '#' | '|' | '{' | '}' | '[' | ']' | '\u{7f}'
    ) || c.is_control()
}

/// Canonicalizes a raw title: URL-decode, convert underscores to spaces, and
/// trim surrounding whitespace.
///
/// Fails if the result is empty, contains a character from the invalid set,
/// resembles an HTML entity, or has a malformed subpage path (leading or
/// trailing `/`, or `//`).
pub fn canonicalize(raw: &str) -> Result<String, TitleError> {
    let decoded = percent_encoding::percent_decode_str(raw).decode_utf8_lossy();
    let title = decoded.replace('_', " ");
    let title = title.trim();

    if title.is_empty() {
        return Err(TitleError::Empty);
    }
    if let Some(c) = title.chars().find(|c| invalid_title_char(*c)) {
        return Err(TitleError::BadChar(c));
    }
    if ENTITY_RE.is_match(title) {
        return Err(TitleError::BadChar('&'));
    }
    if title.starts_with('/') || title.ends_with('/') {
        return Err(TitleError::BadChar('/'));
    }
    if title.contains("//") {
        return Err(TitleError::BadChar('/'));
    }

    Ok(title.to_string())
}

/// Splits a full title into its namespace and title parts.
///
/// If the prefix before the first `:` is not a known namespace name, the whole
/// string is a main-namespace title.
pub fn split_title(full_title: &str) -> (&'static Namespace, String) {
    if let Some((prefix, rest)) = full_title.split_once(SEPARATOR)
        && let Some(ns) = Namespace::find_by_name(prefix.trim())
    {
        return (ns, rest.trim_start().to_string());
    }
    (Namespace::main(), full_title.to_string())
}

/// Canonicalizes and splits a raw title in one step.
///
/// A title that is empty after removing the namespace prefix (`"Wiki:"`,
/// `":"`) is rejected like a fully empty one.
pub fn resolve(raw: &str) -> Result<(&'static Namespace, String), TitleError> {
    let (ns, title) = split_title(&canonicalize(raw)?);
    if title.is_empty() {
        return Err(TitleError::Empty);
    }
    Ok((ns, title))
}

/// The characters to keep verbatim when URL-encoding a title: `/` and `:` on
/// top of the unreserved set.
const TITLE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b':')
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~');

/// Escapes all URL special characters from the given page title, converting
/// spaces to underscores first.
pub fn url_encode(title: &str) -> String {
    let underscored = title.replace(' ', "_");
    utf8_percent_encode(&underscored, TITLE_ENCODE_SET).to_string()
}

/// Percent-decodes a URL part.
pub fn url_decode(input: &str) -> Cow<'_, str> {
    percent_encoding::percent_decode_str(input).decode_utf8_lossy()
}

/// Uppercases the first letter of a title. Used to derive a canonical
/// spelling for pages that do not exist yet; stored pages keep the casing
/// they were created with.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// The base name of a title: the part before the first `/` when the namespace
/// supports subpages (Special titles are also split this way, so that
/// `Special:Subpages/Foo` routes on `Subpages`).
pub fn base_name<'a>(ns: &Namespace, title: &'a str) -> &'a str {
    if ns.allows_subpages || ns.id == Namespace::SPECIAL {
        title.split('/').next().unwrap_or(title)
    } else {
        title
    }
}

/// The page name of a title: the part after the last `/` when the namespace
/// supports subpages.
pub fn page_name<'a>(ns: &Namespace, title: &'a str) -> &'a str {
    if ns.allows_subpages {
        title.rsplit('/').next().unwrap_or(title)
    } else {
        title
    }
}

/// The parent title: the part before the last `/` when the namespace supports
/// subpages (or is Special).
pub fn parent_title<'a>(ns: &Namespace, title: &'a str) -> &'a str {
    if (ns.allows_subpages || ns.id == Namespace::SPECIAL)
        && let Some((parent, _)) = title.rsplit_once('/')
    {
        parent
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_decodes_and_normalizes() {
        assert_eq!(canonicalize("main%20page").unwrap(), "main page");
        assert_eq!(canonicalize("Main_Page").unwrap(), "Main Page");
        assert_eq!(canonicalize("  Page  ").unwrap(), "Page");
    }

    #[test]
    fn canonicalize_rejections() {
        assert_eq!(canonicalize(""), Err(TitleError::Empty));
        assert_eq!(canonicalize("   "), Err(TitleError::Empty));
        assert_eq!(canonicalize("Foo|Bar"), Err(TitleError::BadChar('|')));
        assert_eq!(canonicalize("A{B"), Err(TitleError::BadChar('{')));
        assert_eq!(canonicalize("A\u{1}B"), Err(TitleError::BadChar('\u{1}')));
        assert_eq!(canonicalize("A&amp;B"), Err(TitleError::BadChar('&')));
        assert_eq!(canonicalize("/Sub"), Err(TitleError::BadChar('/')));
        assert_eq!(canonicalize("Page/"), Err(TitleError::BadChar('/')));
        assert_eq!(canonicalize("A//B"), Err(TitleError::BadChar('/')));
    }

    #[test]
    fn split_recognizes_namespaces_and_aliases() {
        let (ns, title) = split_title("Wiki:Main Page");
        assert_eq!(ns.id, Namespace::WIKI);
        assert_eq!(title, "Main Page");

        let (ns, title) = split_title("project:Main Page");
        assert_eq!(ns.id, Namespace::WIKI);
        assert_eq!(title, "Main Page");

        let (ns, title) = split_title("No Such:Thing");
        assert_eq!(ns.id, Namespace::MAIN);
        assert_eq!(title, "No Such:Thing");
    }

    #[test]
    fn resolve_rejects_bare_separator() {
        assert_eq!(resolve(":"), Err(TitleError::Empty));
        assert_eq!(resolve("Wiki:"), Err(TitleError::Empty));
    }

    #[test]
    fn url_round_trip() {
        for full in ["Main Page", "Wiki:Main Page", "User:Ada/Notes", "Café"] {
            let encoded = url_encode(full);
            let (ns, title) = resolve(&encoded).unwrap();
            assert_eq!(ns.full_title(&title), full, "round-trip of {full:?}");
        }
    }

    #[test]
    fn url_encoding_keeps_slash_and_colon() {
        assert_eq!(url_encode("User:Ada/Notes"), "User:Ada/Notes");
        assert_eq!(url_encode("Main Page"), "Main_Page");
        assert_eq!(url_encode("50% done"), "50%25_done");
    }

    #[test]
    fn subpage_accessors() {
        let user = Namespace::find_by_id(Namespace::USER).unwrap();
        assert_eq!(base_name(user, "Ada/Notes/2024"), "Ada");
        assert_eq!(page_name(user, "Ada/Notes/2024"), "2024");
        assert_eq!(parent_title(user, "Ada/Notes/2024"), "Ada/Notes");
        assert_eq!(base_name(user, "Ada"), "Ada");

        let main = Namespace::main();
        assert_eq!(base_name(main, "A/B"), "A/B");
        assert_eq!(page_name(main, "A/B"), "A/B");
    }
}
