//! Site-wide configuration.
//!
//! Everything here is read-only after process start-up. Values that can be
//! overridden from the command line (bind address, base URI, site name) live
//! in [`Args`](crate::Args); this module holds the part of the configuration
//! that the wiki core itself depends on.

use std::sync::OnceLock;

/// URL path prefix of the main wiki view.
pub const WIKI_PATH: &str = "/wiki";
/// URL path prefix of the wiki resource API.
pub const WIKI_API_PATH: &str = "/wiki-api";
/// URL path prefix of the non-wiki API.
pub const API_PATH: &str = "/api";
/// URL path prefix for static assets.
pub const STATIC_PATH: &str = "/static";

/// Full title of the page served when no title is given.
pub const MAIN_PAGE_TITLE: &str = "Wiki:Main Page";

/// Name of the internal account used by background maintenance edits.
pub const SETUP_USERNAME: &str = "Wiki Setup";

/// Maximum length of a revision comment, in characters.
pub const COMMENT_MAX_LENGTH: usize = 200;

/// Number of days during which an account is considered new.
pub const NEW_ACCOUNT_DAYS: i64 = 30;

/// How long a successful parse stays cached before it is re-rendered.
pub const PARSE_CACHE_TTL: time::Duration = time::Duration::days(1);

/// A display language.
///
/// Number formatting is driven by the separator pair; date formatting falls
/// back to [`default_datetime_format`](Language::default_datetime_format)
/// when the caller does not supply a format string.
#[derive(Debug, Eq, PartialEq)]
pub struct Language {
    /// The IETF-ish language code.
    pub code: &'static str,
    /// The language’s own name for itself.
    pub name: &'static str,
    /// The decimal separator.
    pub decimal_separator: char,
    /// The digit group separator, if the language uses one.
    pub group_separator: Option<char>,
    /// The strftime-style format used when none is given.
    pub default_datetime_format: &'static str,
}

impl Language {
    /// Formats a number using this language’s separators.
    pub fn format_number(&self, n: f64) -> String {
        let raw = crate::common::strval(n);
        let (int_part, dec_part) = raw.split_once('.').map_or((&*raw, None), |(i, d)| (i, Some(d)));
        let (sign, digits) = int_part
            .strip_prefix('-')
            .map_or(("", int_part), |rest| ("-", rest));

        let mut out = String::from(sign);
        if let Some(sep) = self.group_separator {
            for (index, chunk) in digits.as_bytes().rchunks(3).rev().enumerate() {
                if index != 0 {
                    out.push(sep);
                }
                // Chunks of a Rust-formatted number are always ASCII.
                out += str::from_utf8(chunk).unwrap_or_default();
            }
        } else {
            out += digits;
        }
        if let Some(dec) = dec_part {
            out.push(self.decimal_separator);
            out += dec;
        }
        out
    }

    /// Formats a date using a strftime-style format string, defaulting to
    /// this language’s format when `format` is `None`.
    pub fn format_datetime(
        &self,
        date: time::OffsetDateTime,
        format: Option<&str>,
    ) -> Result<String, crate::common::DateFormatError> {
        crate::common::format_strftime(date, format.unwrap_or(self.default_datetime_format))
    }
}

/// All languages known to the wiki.
pub static LANGUAGES: &[Language] = &[
    Language {
        code: "en",
        name: "English",
        decimal_separator: '.',
        group_separator: Some(','),
        default_datetime_format: "%Y-%m-%dT%H:%M:%S%z",
    },
    Language {
        code: "fr",
        name: "Français",
        decimal_separator: ',',
        group_separator: Some('\u{202f}'),
        default_datetime_format: "%d/%m/%Y %H:%M",
    },
];

/// The language used when a page or user does not specify one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Finds a language by its code.
pub fn language(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|language| language.code == code)
}

/// Returns the default language.
pub fn default_language() -> &'static Language {
    language(DEFAULT_LANGUAGE).unwrap()
}

/// Runtime site identity, set once from the command line at start-up.
#[derive(Debug)]
pub struct Site {
    /// Display name of the wiki.
    pub name: String,
    /// Host name used when emitting absolute URLs.
    pub server_name: String,
}

/// The process-wide site identity.
static SITE: OnceLock<Site> = OnceLock::new();

/// Installs the site identity. Later calls are ignored.
pub fn init_site(name: String, server_name: String) {
    if SITE.set(Site { name, server_name }).is_err() {
        log::warn!("Site configuration was already initialised");
    }
}

/// Returns the site identity, or a built-in default when running without
/// [`init_site`] (unit tests, mostly).
pub fn site() -> &'static Site {
    SITE.get_or_init(|| Site {
        name: "wikid".to_string(),
        server_name: "localhost".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        let en = language("en").unwrap();
        assert_eq!(en.format_number(1234567.25), "1,234,567.25");
        assert_eq!(en.format_number(-1000.0), "-1,000");
        assert_eq!(en.format_number(12.0), "12");

        let fr = language("fr").unwrap();
        assert_eq!(fr.format_number(1234.5), "1\u{202f}234,5");
    }

    #[test]
    fn language_lookup() {
        assert_eq!(language("fr").map(|l| l.name), Some("Français"));
        assert!(language("tlh").is_none());
    }
}
