//! Magic variable implementations and their registry.
//!
//! Magic variables are named value producers evaluated against the parser
//! context: the current instant, the page and revision being parsed, the
//! site identity, and wiki-wide statistics. Most page-scoped variables
//! accept an optional page title argument to resolve against another page.

use super::Context;
use crate::{
    common, config,
    db::{CategoryFilter, models::{Page, Revision}},
    title::{self, Namespace},
};
use std::{collections::HashMap, sync::LazyLock};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// The function signature of a magic variable.
pub type Handler = fn(&mut Context<'_>, &[String]) -> Result<String, String>;

/// A magic variable definition: a name, an arity window, and a handler.
pub struct MagicVariable {
    /// The variable name, conventionally SCREAMING_SNAKE_CASE.
    pub name: &'static str,
    /// Minimum number of arguments.
    pub min_args: usize,
    /// Maximum number of arguments.
    pub max_args: usize,
    /// The implementation.
    pub eval: Handler,
}

impl MagicVariable {
    /// Runs the arity check, then the variable’s own evaluation.
    pub fn call(&self, ctx: &mut Context<'_>, args: &[String]) -> Result<String, String> {
        if args.len() < self.min_args || args.len() > self.max_args {
            return Err(format!(
                "'{}' expects between {} and {} argument(s), got {}",
                self.name,
                self.min_args,
                self.max_args,
                args.len()
            ));
        }
        (self.eval)(ctx, args)
    }
}

/// Resolves the optional page-title argument, defaulting to the context page.
fn page_from_args(ctx: &Context<'_>, args: &[String]) -> Result<Page, String> {
    match args.first() {
        None => Ok(ctx.page.clone()),
        Some(raw) => {
            let canonical =
                title::canonicalize(raw).map_err(|err| format!("invalid title: {err}"))?;
            let (ns, name) = title::split_title(&canonical);
            if name.is_empty() {
                return Err("invalid title: empty title".to_string());
            }
            Ok(ctx.repo.get(ns, &name))
        }
    }
}

/// Resolves the revision the `REVISION_*` family reads from: the latest
/// revision of the argument page, or the revision being parsed.
fn revision_from_args(ctx: &Context<'_>, args: &[String]) -> Result<Option<Revision>, String> {
    if args.is_empty() {
        Ok(ctx.revision.clone())
    } else {
        let page = page_from_args(ctx, args)?;
        Ok(ctx.repo.latest_revision(page.namespace_id, &page.title, true))
    }
}

/// The date the `REVISION_*` family formats: the resolved revision’s date, or
/// the current instant when there is none.
fn revision_date(ctx: &Context<'_>, args: &[String]) -> Result<OffsetDateTime, String> {
    Ok(revision_from_args(ctx, args)?.map_or(ctx.date, |revision| revision.date))
}

/// Formats an instant as ISO-8601.
fn iso(date: OffsetDateTime) -> Result<String, String> {
    date.format(&Rfc3339).map_err(|err| err.to_string())
}

/// The `HH:MM` form of an instant.
fn clock(date: OffsetDateTime) -> String {
    format!("{:02}:{:02}", date.hour(), date.minute())
}

/// A set-once content directive (`DISPLAY_TITLE`, `DEFAULT_SORT_KEY`).
fn set_once(
    name: &str,
    slot: &mut Option<String>,
    args: &[String],
) -> Result<String, String> {
    match args.get(1).map(String::as_str) {
        Some("no_replace") => {
            if slot.is_none() {
                *slot = Some(args[0].clone());
            }
            Ok(String::new())
        }
        None => {
            if slot.is_some() {
                return Err(format!("{name} already set"));
            }
            *slot = Some(args[0].clone());
            Ok(String::new())
        }
        Some(other) => Err(format!("invalid parameter: '{other}'")),
    }
}

/// The magic variable registry, keyed by name. Built once at start-up.
#[allow(clippy::too_many_lines)]
pub fn registry() -> &'static HashMap<&'static str, MagicVariable> {
    static REGISTRY: LazyLock<HashMap<&'static str, MagicVariable>> = LazyLock::new(|| {
        /// Shorthand for one registry entry.
        fn mv(name: &'static str, min_args: usize, max_args: usize, eval: Handler) -> MagicVariable {
            MagicVariable { name, min_args, max_args, eval }
        }

        let variables = [
            // Date and time, current.
            mv("CURRENT_YEAR", 0, 0, |ctx, _| Ok(ctx.date.year().to_string())),
            mv("CURRENT_MONTH", 0, 0, |ctx, _| {
                Ok(u8::from(ctx.date.month()).to_string())
            }),
            mv("CURRENT_MONTH_P", 0, 0, |ctx, _| {
                Ok(format!("{:02}", u8::from(ctx.date.month())))
            }),
            mv("CURRENT_WEEK", 0, 0, |ctx, _| {
                common::format_strftime(ctx.date, "%W").map_err(|err| err.to_string())
            }),
            mv("CURRENT_DAY", 0, 0, |ctx, _| Ok(ctx.date.day().to_string())),
            mv("CURRENT_DAY_P", 0, 0, |ctx, _| Ok(format!("{:02}", ctx.date.day()))),
            mv("CURRENT_DOW", 0, 0, |ctx, _| {
                Ok(ctx.date.weekday().number_days_from_monday().to_string())
            }),
            mv("CURRENT_TIME", 0, 0, |ctx, _| Ok(clock(ctx.date))),
            mv("CURRENT_HOUR", 0, 0, |ctx, _| Ok(ctx.date.hour().to_string())),
            mv("CURRENT_HOUR_P", 0, 0, |ctx, _| Ok(format!("{:02}", ctx.date.hour()))),
            mv("CURRENT_MINUTE", 0, 0, |ctx, _| Ok(ctx.date.minute().to_string())),
            mv("CURRENT_MINUTE_P", 0, 0, |ctx, _| {
                Ok(format!("{:02}", ctx.date.minute()))
            }),
            mv("CURRENT_TIMESTAMP", 0, 0, |ctx, _| {
                Ok(ctx.date.unix_timestamp().to_string())
            }),
            mv("CURRENT_ISO_DATE", 0, 0, |ctx, _| iso(ctx.date)),
            // Date and time, resolved against a revision.
            mv("REVISION_YEAR", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| date.year().to_string())
            }),
            mv("REVISION_MONTH", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| u8::from(date.month()).to_string())
            }),
            mv("REVISION_MONTH_P", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| format!("{:02}", u8::from(date.month())))
            }),
            mv("REVISION_WEEK", 0, 1, |ctx, args| {
                let date = revision_date(ctx, args)?;
                common::format_strftime(date, "%W").map_err(|err| err.to_string())
            }),
            mv("REVISION_DAY", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| date.day().to_string())
            }),
            mv("REVISION_DAY_P", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| format!("{:02}", date.day()))
            }),
            mv("REVISION_DOW", 0, 1, |ctx, args| {
                revision_date(ctx, args)
                    .map(|date| date.weekday().number_days_from_monday().to_string())
            }),
            mv("REVISION_TIME", 0, 1, |ctx, args| revision_date(ctx, args).map(clock)),
            mv("REVISION_HOUR", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| date.hour().to_string())
            }),
            mv("REVISION_HOUR_P", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| format!("{:02}", date.hour()))
            }),
            mv("REVISION_MINUTE", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| date.minute().to_string())
            }),
            mv("REVISION_MINUTE_P", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| format!("{:02}", date.minute()))
            }),
            mv("REVISION_TIMESTAMP", 0, 1, |ctx, args| {
                revision_date(ctx, args).map(|date| date.unix_timestamp().to_string())
            }),
            mv("REVISION_ISO_DATE", 0, 1, |ctx, args| {
                revision_date(ctx, args).and_then(iso)
            }),
            // Site.
            mv("SITE_NAME", 0, 0, |_, _| Ok(config::site().name.clone())),
            mv("SERVER_URL", 0, 0, |_, _| {
                Ok(format!("//{}", config::site().server_name))
            }),
            mv("SERVER_NAME", 0, 0, |_, _| Ok(config::site().server_name.clone())),
            mv("WIKI_PATH", 0, 0, |_, _| Ok(config::WIKI_PATH.to_string())),
            mv("WIKI_API_PATH", 0, 0, |_, _| Ok(config::WIKI_API_PATH.to_string())),
            mv("OTTM_API_PATH", 0, 0, |_, _| Ok(config::API_PATH.to_string())),
            mv("STATIC_PATH", 0, 0, |_, _| Ok(config::STATIC_PATH.to_string())),
            // Page.
            mv("PAGE_ID", 0, 1, |ctx, args| {
                let page = page_from_args(ctx, args)?;
                Ok(ctx
                    .repo
                    .revisions(page.namespace_id, &page.title)
                    .first()
                    .map(|revision| revision.id.to_string())
                    .unwrap_or_default())
            }),
            mv("PAGE_LANGUAGE", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.content_language)
            }),
            mv("PAGE_PROTECTION_LEVEL", 0, 1, |ctx, args| {
                let page = page_from_args(ctx, args)?;
                Ok(ctx
                    .repo
                    .protection(page.namespace_id, &page.title)
                    .map_or_else(|| "all".to_string(), |protection| protection.protection_level))
            }),
            mv("PAGE_PROTECTION_EXPIRY", 0, 1, |ctx, args| {
                let page = page_from_args(ctx, args)?;
                match ctx
                    .repo
                    .protection(page.namespace_id, &page.title)
                    .and_then(|protection| protection.end_date)
                {
                    Some(end) => iso(end),
                    None => Ok("infinity".to_string()),
                }
            }),
            // Revision.
            mv("REVISION_ID", 0, 1, |ctx, args| {
                Ok(revision_from_args(ctx, args)?
                    .map(|revision| revision.id.to_string())
                    .unwrap_or_default())
            }),
            mv("REVISION_SIZE", 0, 1, |ctx, args| {
                Ok(revision_from_args(ctx, args)?
                    .map_or(0, |revision| revision.byte_size())
                    .to_string())
            }),
            mv("REVISION_AUTHOR", 0, 1, |ctx, args| {
                Ok(match revision_from_args(ctx, args)? {
                    Some(revision) => ctx
                        .repo
                        .user_by_id(revision.author_id)
                        .map(|author| author.username)
                        .unwrap_or_default(),
                    None => ctx
                        .user
                        .as_ref()
                        .map(|user| user.username.clone())
                        .unwrap_or_default(),
                })
            }),
            // Titles.
            mv("FULL_PAGE_TITLE", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.full_title())
            }),
            mv("PAGE_TITLE", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.title)
            }),
            mv("PAGE_BASE_NAME", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.base_name().to_string())
            }),
            mv("PAGE_PARENT_TITLE", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.parent_title().to_string())
            }),
            mv("PAGE_NAME", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.page_name().to_string())
            }),
            mv("FULL_PAGE_TITLE_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(&page.full_title()))
            }),
            mv("PAGE_TITLE_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(&page.title))
            }),
            mv("PAGE_BASE_NAME_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(page.base_name()))
            }),
            mv("PAGE_PARENT_TITLE_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(page.parent_title()))
            }),
            mv("PAGE_NAME_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(page.page_name()))
            }),
            mv("PAGE_PATH", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| {
                    format!("{}/{}", config::WIKI_PATH, title::url_encode(&page.full_title()))
                })
            }),
            mv("PAGE_URL", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| {
                    format!(
                        "//{}{}/{}",
                        config::site().server_name,
                        config::WIKI_PATH,
                        title::url_encode(&page.full_title())
                    )
                })
            }),
            // Namespaces.
            mv("NAMESPACE_NAME", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.namespace().name.to_string())
            }),
            mv("NAMESPACE_ID", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| page.namespace_id.to_string())
            }),
            mv("NAMESPACE_NAME_U", 0, 1, |ctx, args| {
                page_from_args(ctx, args).map(|page| title::url_encode(page.namespace().name))
            }),
            // Statistics.
            mv("NUMBER_OF_PAGES", 0, 0, |ctx, _| Ok(ctx.repo.page_count().to_string())),
            mv("NUMBER_OF_ARTICLES", 0, 0, |ctx, _| {
                Ok(ctx.repo.article_count().to_string())
            }),
            mv("NUMBER_OF_FILES", 0, 0, |ctx, _| Ok(ctx.repo.file_count().to_string())),
            mv("NUMBER_OF_EDITS", 0, 0, |ctx, _| Ok(ctx.repo.edit_count().to_string())),
            mv("NUMBER_OF_USERS", 0, 0, |ctx, _| Ok(ctx.repo.user_count().to_string())),
            mv("NUMBER_OF_ACTIVE_USERS", 0, 0, |ctx, _| {
                Ok(ctx.repo.active_user_count(ctx.date).to_string())
            }),
            mv("PAGES_IN_CATEGORY", 1, 2, |ctx, args| {
                if ctx.page.namespace_id != Namespace::CATEGORY {
                    return Ok(String::new());
                }
                let filter = match args.get(1).map(String::as_str) {
                    None | Some("all") => CategoryFilter::All,
                    Some("pages") => CategoryFilter::Pages,
                    Some("subcats") => CategoryFilter::Subcategories,
                    Some("files") => CategoryFilter::Files,
                    Some(other) => return Err(format!("invalid filter: '{other}'")),
                };
                Ok(ctx.repo.pages_in_category(&args[0], filter).to_string())
            }),
            mv("NUMBER_IN_GROUP", 1, 1, |ctx, args| {
                ctx.repo
                    .group_member_count(&args[0])
                    .map(|count| count.to_string())
                    .map_err(|_| format!("invalid user group: '{}'", args[0]))
            }),
            mv("PAGES_IN_NS", 1, 1, |ctx, args| {
                let id = args[0]
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| format!("invalid namespace ID: '{}'", args[0]))?;
                if Namespace::find_by_id(id).is_none() {
                    return Err(format!("no namespace with ID {id}"));
                }
                Ok(ctx.repo.pages_in_namespace(id).to_string())
            }),
            // Content directives.
            mv("DISPLAY_TITLE", 1, 2, |ctx, args| {
                let mut slot = ctx.display_title.take();
                let result = set_once("DISPLAY_TITLE", &mut slot, args);
                ctx.display_title = slot;
                result
            }),
            mv("DEFAULT_SORT_KEY", 1, 2, |ctx, args| {
                let mut slot = ctx.default_sort_key.take();
                let result = set_once("DEFAULT_SORT_KEY", &mut slot, args);
                ctx.default_sort_key = slot;
                result
            }),
        ];
        variables.into_iter().map(|variable| (variable.name, variable)).collect()
    });
    &REGISTRY
}
