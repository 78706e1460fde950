//! Small helpers shared across the wiki core.

use time::OffsetDateTime;

/// Returns the current instant in UTC.
///
/// All dates stored by the wiki are UTC; offsets only appear at display time.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Stringifies a number, using integer formatting for integral values.
pub fn strval(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        // Clippy: the truncation check above makes the cast lossless.
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// Errors from strftime-style date formatting.
#[derive(Debug, thiserror::Error)]
pub enum DateFormatError {
    /// A `%x` directive this implementation does not understand.
    #[error("unknown date format directive '%{0}'")]
    UnknownDirective(char),
    /// A directive translated into something the `time` crate rejected.
    #[error(transparent)]
    Description(#[from] time::error::InvalidFormatDescription),
    /// The date could not be formatted.
    #[error(transparent)]
    Format(#[from] time::error::Format),
}

/// Formats a date using a strftime-style format string.
///
/// Only the directives actually used by wiki content are supported: `%Y`,
/// `%y`, `%m`, `%d`, `%H`, `%M`, `%S`, `%W`, `%z`, and `%%`.
pub fn format_strftime(date: OffsetDateTime, format: &str) -> Result<String, DateFormatError> {
    let mut description = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            if c == '[' {
                // '[' opens a component in the description language
                description += "[[";
            } else {
                description.push(c);
            }
            continue;
        }
        match chars.next() {
            Some('Y') => description += "[year]",
            Some('y') => description += "[year repr:last_two]",
            Some('m') => description += "[month]",
            Some('d') => description += "[day]",
            Some('H') => description += "[hour]",
            Some('M') => description += "[minute]",
            Some('S') => description += "[second]",
            Some('W') => description += "[week_number repr:monday]",
            Some('z') => description += "[offset_hour sign:mandatory][offset_minute]",
            Some('%') => description.push('%'),
            Some(other) => return Err(DateFormatError::UnknownDirective(other)),
            None => return Err(DateFormatError::UnknownDirective('%')),
        }
    }

    let items = time::format_description::parse(&description)?;
    Ok(date.format(&items)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn strval_trims_integral_floats() {
        assert_eq!(strval(3.0), "3");
        assert_eq!(strval(-12.0), "-12");
        assert_eq!(strval(2.5), "2.5");
    }

    #[test]
    fn strftime_basics() {
        let date = datetime!(2024-02-05 08:07:06 UTC);
        assert_eq!(
            format_strftime(date, "%Y-%m-%dT%H:%M:%S%z").unwrap(),
            "2024-02-05T08:07:06+0000"
        );
        assert_eq!(format_strftime(date, "%d/%m/%y").unwrap(), "05/02/24");
        assert_eq!(format_strftime(date, "100%%").unwrap(), "100%");
        assert!(matches!(
            format_strftime(date, "%Q"),
            Err(DateFormatError::UnknownDirective('Q'))
        ));
    }

    #[test]
    fn strftime_week_number_is_monday_based() {
        // 2024-01-01 is a Monday, so the first of January starts week 01.
        assert_eq!(
            format_strftime(datetime!(2024-01-01 00:00:00 UTC), "%W").unwrap(),
            "01"
        );
    }
}
