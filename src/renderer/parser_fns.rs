//! Parser function implementations.
//!
//! <https://www.mediawiki.org/wiki/Help:Extension:ParserFunctions>

// Clippy: Functions signatures all conform to a specific API; inline modules
// are clearer with wildcard import.
#![allow(clippy::unnecessary_wraps, clippy::wildcard_imports)]

use super::{Result, State, outline::anchor_id, stack::Args};
use crate::{
    common::{format_date, parse_date, query_encode},
    expr,
};
use core::fmt::Write as _;

/// The function signature of a parser function.
pub(crate) type ParserFn = fn(&mut String, &mut State<'_>, &Args<'_>) -> Result;

mod cond {
    //! Flow control parser functions.

    use super::*;

    /// `{{#expr: expression}}`
    pub fn expr(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(expr) = arguments.eval_trim(state, 0)? {
            match expr::do_expression(&expr) {
                Ok(Some(result)) => *out += &expr::format_result(result),
                Ok(None) => {}
                Err(err) => log::debug!("#expr: '{expr}': {err}"),
            }
        }

        Ok(())
    }

    /// `{{#if: condition | consequent (!condition.trim().is_empty()) | alternate }}`
    pub fn r#if(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let lhs_is_empty = arguments
            .eval_trim(state, 0)?
            .is_none_or(|value| value.is_empty());
        let index = 1 + usize::from(lhs_is_empty);
        if let Some(value) = arguments.eval_trim(state, index)? {
            *out += &value;
        }

        Ok(())
    }

    /// `{{#ifeq: lhs | rhs | consequent (lhs == rhs) | alternate }}`
    pub fn if_eq(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let lhs = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let rhs = arguments.eval_trim(state, 1)?.unwrap_or_default();
        let is_eq = lhs == rhs;
        if let Some(value) = arguments.eval_trim(state, 2 + usize::from(!is_eq))? {
            *out += &value;
        }

        Ok(())
    }

    /// `{{#ifexpr: expression | consequent (expression != 0.0) | alternate }}`
    pub fn if_expr(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let expr = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let is_true = match expr::do_expression(&expr) {
            Ok(result) => result.is_some_and(|result| result != 0.0),
            Err(err) => {
                log::debug!("#ifexpr: '{expr}': {err}");
                return Ok(());
            }
        };

        if let Some(value) = arguments.eval_trim(state, 1 + usize::from(!is_true))? {
            *out += &value;
        }

        Ok(())
    }

    /// `{{#switch: match | case [| case ...] = value | default }}`
    pub fn switch(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let lhs = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let mut found = false;
        let mut consequent = None;

        let len = arguments.len();
        for index in 1..len {
            let Some((key, value)) = arguments.raw_kv(index) else {
                break;
            };

            // If the case is in the form `k=v` then it is a new case,
            // otherwise we must record whether the case matched and
            // continue processing until a `k=v` is encountered to know
            // the consequent
            let is_kv = key.is_some();
            let rhs = arguments.expand_trim(state, key.unwrap_or(value))?;

            // Default value can either be a bare final parameter or it
            // can be `#default = value`. A bare final parameter replaces
            // an earlier `#default`
            if rhs == "#default" && is_kv {
                consequent = Some(value);
            }

            if !found {
                found = lhs == rhs;
            }

            if found && is_kv {
                consequent = Some(value);
                break;
            }

            if index + 1 == len && !is_kv {
                consequent = Some(value);
            }
        }

        if let Some(consequent) = consequent {
            *out += &arguments.expand_trim(state, consequent)?;
        }

        Ok(())
    }
}

mod string {
    //! String manipulation functions.

    use super::*;

    /// `{{anchorencode: text }}`
    pub fn anchor_encode(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(text) = arguments.eval_trim(state, 0)? {
            *out += &anchor_id(&text);
        }
        Ok(())
    }

    /// `{{lc: string }}`
    pub fn lc(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(value) = arguments.eval_trim(state, 0)? {
            *out += &value.to_lowercase();
        }
        Ok(())
    }

    /// `{{lcfirst: string }}`
    pub fn lc_first(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(value) = arguments.eval_trim(state, 0)? {
            let mut text = value.chars();
            if let Some(first) = text.next() {
                write!(out, "{}{}", first.to_lowercase(), text.as_str())?;
            }
        }
        Ok(())
    }

    /// `{{#len: string }}`
    pub fn len(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let value = arguments.eval_trim(state, 0)?.unwrap_or_default();
        write!(out, "{}", html_escape::decode_html_entities(&value).chars().count())?;
        Ok(())
    }

    /// `{{#pos: string | search term }}`
    pub fn pos(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let value = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let needle = arguments.eval_trim(state, 1)?.unwrap_or_default();
        write!(out, "{}", position(&value, &needle, value.find(&needle)))?;
        Ok(())
    }

    /// `{{#replace: string | search term | replacement }}`
    pub fn replace(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let value = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let from = arguments.eval_trim(state, 1)?.unwrap_or_default();
        if from.is_empty() {
            *out += &value;
        } else {
            let to = arguments.eval_trim(state, 2)?.unwrap_or_default();
            *out += &value.replace(&from, &to);
        }
        Ok(())
    }

    /// `{{#rpos: string | search term }}`
    pub fn rpos(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let value = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let needle = arguments.eval_trim(state, 1)?.unwrap_or_default();
        write!(out, "{}", position(&value, &needle, value.rfind(&needle)))?;
        Ok(())
    }

    /// `{{#sub: string | start [| length] }}`
    pub fn sub(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        let value = arguments.eval_trim(state, 0)?.unwrap_or_default();
        let start = arguments
            .eval_trim(state, 1)?
            .and_then(|start| start.parse::<i64>().ok())
            .unwrap_or(1);
        let len = arguments
            .eval_trim(state, 2)?
            .and_then(|len| len.parse::<i64>().ok());
        *out += &substring(&value, start, len);
        Ok(())
    }

    /// `{{uc: string }}`
    pub fn uc(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(value) = arguments.eval_trim(state, 0)? {
            *out += &value.to_uppercase();
        }
        Ok(())
    }

    /// `{{ucfirst: string }}`
    pub fn uc_first(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(value) = arguments.eval_trim(state, 0)? {
            let mut text = value.chars();
            if let Some(first) = text.next() {
                write!(out, "{}{}", first.to_uppercase(), text.as_str())?;
            }
        }
        Ok(())
    }

    /// `{{urlencode: string }}`
    pub fn url_encode(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(value) = arguments.eval_trim(state, 0)? {
            *out += &query_encode(&value);
        }
        Ok(())
    }
}

mod time {
    //! Date and time functions.

    use super::*;

    /// `{{#time: format [| date] }}`
    pub fn time(out: &mut String, state: &mut State<'_>, arguments: &Args<'_>) -> Result {
        if let Some(format) = arguments.eval_trim(state, 0)? {
            let date = arguments
                .eval_trim(state, 1)?
                .filter(|date| !date.is_empty())
                .and_then(|date| {
                    let parsed = parse_date(&date);
                    if parsed.is_none() {
                        log::debug!("#time: could not parse date '{date}'");
                    }
                    parsed
                })
                .unwrap_or(state.ctx.now);
            *out += &format_date(date, &format);
        }
        Ok(())
    }
}

/// Known parser functions.
static PARSER_FUNCTIONS: phf::Map<&'static str, ParserFn> = phf::phf_map! {
    "#expr" => cond::expr,
    "#if" => cond::r#if,
    "#ifeq" => cond::if_eq,
    "#ifexpr" => cond::if_expr,
    "#switch" => cond::switch,

    "anchorencode" => string::anchor_encode,
    "lc" => string::lc,
    "lcfirst" => string::lc_first,
    "#len" => string::len,
    "#pos" => string::pos,
    "#replace" => string::replace,
    "#rpos" => string::rpos,
    "#sub" => string::sub,
    "uc" => string::uc,
    "ucfirst" => string::uc_first,
    "urlencode" => string::url_encode,

    "#time" => time::time,
};

/// Finds the parser function with the given lowercase name. Functions which
/// are called with a hash include it in the name.
pub(crate) fn lookup(name: &str) -> Option<ParserFn> {
    PARSER_FUNCTIONS.get(name).copied()
}

/// Converts a byte offset match into a 1-based character position, or 0 if
/// there was no match.
fn position(haystack: &str, needle: &str, found: Option<usize>) -> usize {
    match found {
        Some(offset) if !needle.is_empty() => haystack[..offset].chars().count() + 1,
        _ => 0,
    }
}

/// Takes a substring by characters. `start` is 1-based, and a negative
/// `start` or `len` counts from the end.
fn substring(text: &str, start: i64, len: Option<i64>) -> String {
    let count = i64::try_from(text.chars().count()).unwrap_or(i64::MAX);
    let begin = match start {
        1.. => start - 1,
        0 => 0,
        _ => (count + start).max(0),
    }
    .min(count);
    let end = match len {
        None => count,
        Some(len @ 0..) => begin.saturating_add(len).min(count),
        Some(len) => (count + len).max(begin),
    };

    let skip = usize::try_from(begin).unwrap_or_default();
    let take = usize::try_from(end - begin).unwrap_or_default();
    text.chars().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring() {
        assert_eq!(super::substring("Andalusia", 1, Some(3)), "And");
        assert_eq!(super::substring("Andalusia", 4, None), "alusia");
        assert_eq!(super::substring("Andalusia", -3, None), "sia");
        assert_eq!(super::substring("Andalusia", 2, Some(-2)), "ndalus");
        assert_eq!(super::substring("Andalusia", 20, None), "");
        assert_eq!(super::substring("Andalusia", -20, Some(2)), "An");
        assert_eq!(super::substring("قرطبة", 2, Some(2)), "رط", "counts characters");
    }

    #[test]
    fn position() {
        assert_eq!(super::position("a-b-c", "-", "a-b-c".find('-')), 2);
        assert_eq!(super::position("a-b-c", "-", "a-b-c".rfind('-')), 4);
        assert_eq!(super::position("a-b-c", "x", None), 0);
        assert_eq!(super::position("a", "", Some(0)), 0, "empty needle");
        assert_eq!(super::position("éa", "a", "éa".find('a')), 2, "counts characters");
    }

    #[test]
    fn table() {
        assert!(lookup("#if").is_some());
        assert!(lookup("lc").is_some());
        assert!(lookup("#lc").is_none());
        assert!(lookup("#invoke").is_none(), "modules are not parser functions");
    }
}
