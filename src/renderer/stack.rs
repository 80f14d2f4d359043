//! Template parameters, call arguments, and call stack management.

use super::{Error, Result, State, expand_templates::expand};
use core::fmt;
use indexmap::IndexMap;

/// The key of a template parameter.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ParamKey {
    /// A 1-based positional parameter.
    Positional(usize),
    /// A named parameter.
    Named(String),
}

impl ParamKey {
    /// Creates a key from parameter name text. A canonical decimal number is
    /// the same key as the positional parameter with that number.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        if !name.starts_with('0')
            && !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_digit())
            && let Ok(index) = name.parse()
        {
            Self::Positional(index)
        } else {
            Self::Named(name.to_string())
        }
    }
}

impl From<usize> for ParamKey {
    fn from(index: usize) -> Self {
        Self::Positional(index)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional(index) => write!(f, "{index}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// An ordered map of template parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(IndexMap<ParamKey, String>);

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value but keeping its
    /// position.
    pub fn insert(&mut self, key: impl Into<ParamKey>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, key: impl Into<ParamKey>) -> Option<&str> {
        self.0.get(&key.into()).map(String::as_str)
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &str)> {
        self.0.iter().map(|(key, value)| (key, value.as_str()))
    }

    /// Returns a copy of these parameters overridden by `inner`.
    ///
    /// Only keys present in both maps are replaced; everything else from both
    /// maps is kept.
    #[must_use]
    pub fn merged(&self, inner: Params) -> Params {
        let mut out = self.clone();
        out.0.extend(inner.0);
        out
    }
}

impl<K: Into<ParamKey>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Tracks nesting of the two kinds of brackets which protect a `|` or `=`
/// from being treated as a separator.
#[derive(Default)]
struct Depth {
    /// Single `{` nesting.
    braces: usize,
    /// `[[` nesting.
    links: usize,
}

impl Depth {
    /// Updates the depth for the bytes at `index`. Returns the number of
    /// bytes consumed.
    fn step(&mut self, bytes: &[u8], index: usize) -> usize {
        match (bytes[index], bytes.get(index + 1)) {
            (b'[', Some(b'[')) => {
                self.links += 1;
                2
            }
            (b']', Some(b']')) if self.links > 0 => {
                self.links -= 1;
                2
            }
            (b'{', _) => {
                self.braces += 1;
                1
            }
            (b'}', _) => {
                self.braces = self.braces.saturating_sub(1);
                1
            }
            _ => 1,
        }
    }

    /// Returns true if the scanner is not inside any brackets.
    fn is_top(&self) -> bool {
        self.braces == 0 && self.links == 0
    }
}

/// Splits the inner text of a macro on every `|` that is not inside a nested
/// macro, parameter, or wiki-link.
pub(crate) fn split_arguments(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = Depth::default();
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'|' && depth.is_top() {
            parts.push(&text[start..index]);
            start = index + 1;
            index += 1;
        } else {
            index += depth.step(bytes, index);
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Splits an argument into a name and a value on the first `=` which is not
/// inside a nested macro, parameter, or wiki-link.
pub(crate) fn split_key_value(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut depth = Depth::default();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'=' && depth.is_top() {
            return Some((&text[..index], &text[index + 1..]));
        }
        index += depth.step(bytes, index);
    }
    None
}

/// The raw arguments of a function-like call, which are expanded on demand so
/// that untaken branches of conditionals are never evaluated.
pub(crate) struct Args<'a> {
    /// The unexpanded argument text.
    raw: Vec<&'a str>,
    /// The parameters of the calling frame.
    params: &'a Params,
}

impl<'a> Args<'a> {
    /// Creates a new argument list.
    pub fn new(raw: Vec<&'a str>, params: &'a Params) -> Self {
        Self { raw, params }
    }

    /// The parameters of the calling frame.
    pub fn caller_params(&self) -> &'a Params {
        self.params
    }

    /// Expands the argument at `index`. The returned value includes any
    /// leading and trailing whitespace.
    pub fn eval(&self, state: &mut State<'_>, index: usize) -> Result<Option<String>> {
        self.raw
            .get(index)
            .map(|raw| expand(state, raw, self.params))
            .transpose()
    }

    /// Expands the argument at `index` and trims it.
    pub fn eval_trim(&self, state: &mut State<'_>, index: usize) -> Result<Option<String>> {
        Ok(self
            .eval(state, index)?
            .map(|value| value.trim().to_string()))
    }

    /// Expands the argument at `index` as a `key=value` pair. Both parts are
    /// trimmed. The key is `None` if the argument has no top-level `=`.
    pub fn eval_kv(
        &self,
        state: &mut State<'_>,
        index: usize,
    ) -> Result<Option<(Option<String>, String)>> {
        let Some(raw) = self.raw.get(index) else {
            return Ok(None);
        };
        Ok(Some(if let Some((key, value)) = split_key_value(raw) {
            let key = expand(state, key, self.params)?.trim().to_string();
            let value = expand(state, value, self.params)?.trim().to_string();
            (Some(key), value)
        } else {
            (None, expand(state, raw, self.params)?.trim().to_string())
        }))
    }

    /// Splits the unexpanded argument at `index` into an optional key and a
    /// value, without expanding either.
    pub fn raw_kv(&self, index: usize) -> Option<(Option<&'a str>, &'a str)> {
        let raw = self.raw.get(index)?;
        Some(match split_key_value(raw) {
            Some((key, value)) => (Some(key), value),
            None => (None, raw),
        })
    }

    /// Expands some text from an argument in the scope of the caller, and
    /// trims it.
    pub fn expand_trim(&self, state: &mut State<'_>, text: &str) -> Result<String> {
        Ok(expand(state, text, self.params)?.trim().to_string())
    }

    /// Expands every argument from `start` onwards into a parameter map.
    /// Unnamed arguments are numbered from 1.
    pub fn to_params(&self, state: &mut State<'_>, start: usize) -> Result<Params> {
        let mut params = Params::new();
        let mut position = 0_usize;
        for index in start..self.raw.len() {
            if let Some((key, value)) = self.eval_kv(state, index)? {
                if let Some(key) = key {
                    params.insert(ParamKey::new(&key), value);
                } else {
                    position += 1;
                    params.insert(position, value);
                }
            }
        }
        Ok(params)
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.raw.len()
    }
}

/// Checks whether entering `name` would make the call stack too deep or
/// create a loop.
pub(super) fn check_recursion(state: &State<'_>, name: &str) -> Result {
    if state.stack.len() >= state.options.max_depth {
        debug_backtrace(name, &state.stack);
        Err(Error::RecursionLimit(name.to_string()))
    } else if state.stack.iter().any(|frame| frame == name) {
        debug_backtrace(name, &state.stack);
        Err(Error::TemplateLoop(name.to_string()))
    } else {
        Ok(())
    }
}

/// Emits a backtrace to the error log.
fn debug_backtrace(name: &str, stack: &[String]) {
    log::error!(" 0. {name}");
    for (index, frame) in stack.iter().rev().enumerate() {
        log::error!("{:>2}. {frame}", index + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_key() {
        assert_eq!(ParamKey::new("1"), ParamKey::Positional(1));
        assert_eq!(ParamKey::new(" 12 "), ParamKey::Positional(12));
        assert_eq!(ParamKey::new("01"), ParamKey::Named("01".into()));
        assert_eq!(ParamKey::new("0"), ParamKey::Named("0".into()));
        assert_eq!(ParamKey::new("name"), ParamKey::Named("name".into()));
    }

    #[test]
    fn merged() {
        let outer = [("a", "1"), ("b", "2")].into_iter().collect::<Params>();
        let inner = [("b", "3"), ("c", "4")].into_iter().collect::<Params>();
        let merged = outer.merged(inner);
        assert_eq!(merged.get("a"), Some("1"), "outer only key kept");
        assert_eq!(merged.get("b"), Some("3"), "inner key overrides");
        assert_eq!(merged.get("c"), Some("4"), "inner only key kept");
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn split_arguments() {
        assert_eq!(super::split_arguments("a|b|c"), ["a", "b", "c"]);
        assert_eq!(
            super::split_arguments("Infobox|title=[[Al-Andalus|Andalusia]]|type=region"),
            ["Infobox", "title=[[Al-Andalus|Andalusia]]", "type=region"],
            "pipe inside a link is not a separator"
        );
        assert_eq!(
            super::split_arguments("a|{{b|c}}|{{{d|e}}}"),
            ["a", "{{b|c}}", "{{{d|e}}}"],
            "pipe inside a macro is not a separator"
        );
        assert_eq!(super::split_arguments(""), [""]);
        assert_eq!(super::split_arguments("a|"), ["a", ""]);
        assert_eq!(
            super::split_arguments("a]]|b"),
            ["a]]", "b"],
            "unbalanced close does not underflow"
        );
    }

    #[test]
    fn split_key_value() {
        assert_eq!(super::split_key_value("a=b"), Some(("a", "b")));
        assert_eq!(super::split_key_value(" a = b=c"), Some((" a ", " b=c")));
        assert_eq!(super::split_key_value("{{a|b=c}}"), None);
        assert_eq!(super::split_key_value("[[a=b]]"), None);
        assert_eq!(super::split_key_value("plain"), None);
    }
}
