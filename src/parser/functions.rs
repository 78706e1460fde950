//! Parser function implementations and their registry.
//!
//! Parser functions are named, argument-taking value producers callable from
//! expression insertions (`{= name arg1 arg2 =}`). They differ from magic
//! variables in that they may take arguments and are not bound to the current
//! page. Arguments are HTML-entity-decoded before dispatch.

use super::Context;
use crate::{common, config, expr, title};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{collections::HashMap, sync::LazyLock};
use time::{OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339};

/// The function signature of a parser function.
pub type Handler = fn(&mut Context<'_>, &[String]) -> Result<String, String>;

/// A parser function definition: a name, an arity window, and a handler.
pub struct ParserFunction {
    /// The function name.
    pub name: &'static str,
    /// Minimum number of arguments.
    pub min_args: usize,
    /// Maximum number of arguments.
    pub max_args: usize,
    /// The implementation.
    pub eval: Handler,
}

impl ParserFunction {
    /// Runs the arity check, decodes HTML entities in the arguments, then
    /// dispatches.
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
        let args = args
            .iter()
            .map(|arg| html_escape::decode_html_entities(arg).into_owned())
            .collect::<Vec<_>>();
        (self.eval)(ctx, &args)
    }
}

/// The parser function registry, keyed by name. Built once at start-up.
pub fn registry() -> &'static HashMap<&'static str, ParserFunction> {
    static REGISTRY: LazyLock<HashMap<&'static str, ParserFunction>> = LazyLock::new(|| {
        let functions = [
            ParserFunction { name: "url_encode", min_args: 1, max_args: 2, eval: url_encode },
            ParserFunction { name: "url_decode", min_args: 1, max_args: 1, eval: url_decode },
            ParserFunction { name: "ns", min_args: 1, max_args: 1, eval: ns },
            ParserFunction { name: "ns_url", min_args: 1, max_args: 1, eval: ns_url },
            ParserFunction { name: "ns_id", min_args: 1, max_args: 1, eval: ns_id },
            ParserFunction { name: "format_number", min_args: 2, max_args: 2, eval: format_number },
            ParserFunction { name: "format_date", min_args: 2, max_args: 3, eval: format_date },
            ParserFunction { name: "lc", min_args: 1, max_args: 1, eval: lower_case },
            ParserFunction { name: "lc_first", min_args: 1, max_args: 1, eval: lower_case_first },
            ParserFunction { name: "uc", min_args: 1, max_args: 1, eval: upper_case },
            ParserFunction { name: "uc_first", min_args: 1, max_args: 1, eval: upper_case_first },
            ParserFunction { name: "pad_left", min_args: 2, max_args: 3, eval: pad_left },
            ParserFunction { name: "pad_right", min_args: 2, max_args: 3, eval: pad_right },
            ParserFunction { name: "replace", min_args: 3, max_args: 3, eval: replace },
            ParserFunction { name: "language", min_args: 1, max_args: 1, eval: language },
            ParserFunction { name: "expr", min_args: 1, max_args: 1, eval: eval_expr },
            ParserFunction { name: "if", min_args: 3, max_args: 3, eval: cond_if },
            ParserFunction { name: "if_eq", min_args: 4, max_args: 4, eval: cond_if_eq },
            ParserFunction { name: "if_expr", min_args: 3, max_args: 3, eval: cond_if_expr },
            ParserFunction { name: "if_exists", min_args: 3, max_args: 3, eval: cond_if_exists },
        ];
        functions.into_iter().map(|f| (f.name, f)).collect()
    });
    &REGISTRY
}

/// Characters escaped by plain URL encoding: everything but unreserved
/// characters and `/`.
const PLAIN_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped by query-string encoding; spaces become `+` separately.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~')
    .remove(b' ');

/// Encodes a string for use inside a query string.
pub fn query_encode(input: &str) -> String {
    utf8_percent_encode(input, QUERY_SET).to_string().replace(' ', "+")
}

/// `url_encode s [plain|query|wiki_path]`
fn url_encode(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    match args.get(1).map(String::as_str) {
        None | Some("plain") => Ok(utf8_percent_encode(&args[0], PLAIN_SET).to_string()),
        Some("query") => Ok(query_encode(&args[0])),
        Some("wiki_path") => Ok(title::url_encode(&args[0])),
        Some(other) => Err(format!("invalid parameter: '{other}'")),
    }
}

/// `url_decode s`
fn url_decode(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(title::url_decode(&args[0].replace('+', " ")).into_owned())
}

/// Parses a namespace id argument.
fn namespace_arg(arg: &str) -> Result<&'static title::Namespace, String> {
    let id = arg
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid namespace ID: '{arg}'"))?;
    title::Namespace::find_by_id(id).ok_or_else(|| format!("no namespace with ID {id}"))
}

/// `ns id`
fn ns(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    namespace_arg(&args[0]).map(|ns| ns.name.to_string())
}

/// `ns_url id`
fn ns_url(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    namespace_arg(&args[0]).map(|ns| title::url_encode(ns.name))
}

/// `ns_id name`
fn ns_id(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    title::Namespace::find_by_name(args[0].trim())
        .map(|ns| ns.id.to_string())
        .ok_or_else(|| format!("invalid namespace name: '{}'", args[0]))
}

/// `format_number n lang`
fn format_number(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    let n = args[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", args[0]))?;
    let language = config::language(args[1].trim())
        .ok_or_else(|| format!("invalid language code: '{}'", args[1]))?;
    Ok(format!(
        r#"<data value="{}">{}</data>"#,
        common::strval(n),
        language.format_number(n)
    ))
}

/// Parses an ISO-8601-ish date, assuming UTC when no offset is present.
fn parse_iso_date(raw: &str) -> Result<OffsetDateTime, String> {
    if let Ok(date) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(date);
    }
    static FORMATS: &[&str] = &[
        "[year]-[month]-[day]T[hour]:[minute]:[second]",
        "[year]-[month]-[day] [hour]:[minute]:[second]",
        "[year]-[month]-[day]T[hour]:[minute]",
        "[year]-[month]-[day] [hour]:[minute]",
    ];
    for format in FORMATS {
        if let Ok(items) = time::format_description::parse(format)
            && let Ok(date) = PrimitiveDateTime::parse(raw, &items)
        {
            return Ok(date.assume_utc());
        }
    }
    if let Ok(items) = time::format_description::parse("[year]-[month]-[day]")
        && let Ok(date) = time::Date::parse(raw, &items)
    {
        return Ok(date.midnight().assume_utc());
    }
    Err(format!("invalid ISO date: '{raw}'"))
}

/// `format_date iso lang [format]`
fn format_date(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    let date = parse_iso_date(args[0].trim())?;
    let language = config::language(args[1].trim())
        .ok_or_else(|| format!("invalid language code: '{}'", args[1]))?;
    let formatted = language
        .format_datetime(date, args.get(2).map(String::as_str))
        .map_err(|err| err.to_string())?;
    let iso = date.format(&Rfc3339).map_err(|err| err.to_string())?;
    Ok(format!(r#"<time datetime="{iso}">{formatted}</time>"#))
}

/// `lc s`
fn lower_case(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(args[0].to_lowercase())
}

/// `lc_first s`
fn lower_case_first(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(map_first(&args[0], |c| c.to_lowercase().to_string()))
}

/// `uc s`
fn upper_case(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(args[0].to_uppercase())
}

/// `uc_first s`
fn upper_case_first(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(map_first(&args[0], |c| c.to_uppercase().to_string()))
}

/// Applies `f` to the first character of `s`.
fn map_first(s: &str, f: impl Fn(char) -> String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => f(first) + chars.as_str(),
        None => String::new(),
    }
}

/// Parses the common arguments of the padding functions.
fn pad_args(args: &[String]) -> Result<(usize, char), String> {
    let width = args[1]
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid width: '{}'", args[1]))?;
    let fill = match args.get(2) {
        None => ' ',
        Some(fill) => {
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err("fill must be a single character".to_string()),
            }
        }
    };
    Ok((width, fill))
}

/// `pad_left s n [fill]`
fn pad_left(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    let (width, fill) = pad_args(args)?;
    let length = args[0].chars().count();
    let mut out = String::new();
    for _ in length..width {
        out.push(fill);
    }
    out += &args[0];
    Ok(out)
}

/// `pad_right s n [fill]`
fn pad_right(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    let (width, fill) = pad_args(args)?;
    let length = args[0].chars().count();
    let mut out = args[0].clone();
    for _ in length..width {
        out.push(fill);
    }
    Ok(out)
}

/// `replace s from to`
fn replace(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(args[0].replace(&args[1], &args[2]))
}

/// `language code`
fn language(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    config::language(args[0].trim())
        .map(|language| language.name.to_string())
        .ok_or_else(|| format!("invalid language code: '{}'", args[0]))
}

/// `expr expression`
fn eval_expr(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    match expr::evaluate(&args[0]) {
        Ok(Some(value)) => Ok(common::strval(value)),
        Ok(None) => Ok(String::new()),
        Err(err) => Err(err.to_string()),
    }
}

/// `if cond then else` — the condition is true when non-empty.
fn cond_if(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(args[if args[0].is_empty() { 2 } else { 1 }].clone())
}

/// `if_eq a b then else`
fn cond_if_eq(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    Ok(args[if args[0] == args[1] { 2 } else { 3 }].clone())
}

/// `if_expr expression then else` — true when the expression is non-zero.
fn cond_if_expr(_: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    match expr::evaluate(&args[0]) {
        Ok(value) => Ok(args[if value.unwrap_or(0.0) != 0.0 { 1 } else { 2 }].clone()),
        Err(err) => Err(err.to_string()),
    }
}

/// `if_exists title then else`
fn cond_if_exists(ctx: &mut Context<'_>, args: &[String]) -> Result<String, String> {
    let exists = title::canonicalize(&args[0])
        .map(|canonical| {
            let (ns, name) = title::split_title(&canonical);
            !name.is_empty() && ctx.repo.get(ns, &name).exists
        })
        .unwrap_or(false);
    Ok(args[if exists { 1 } else { 2 }].clone())
}
