//! The brace scanner which expands template parameters and macros.

use super::{
    Result, State,
    stack::{ParamKey, Params, split_arguments},
    template,
};
use memchr::memmem;

/// The maximum nesting of [`expand`] calls. Past this, text is returned
/// unexpanded.
const MAX_NESTING: usize = 100;

/// Expands every `{{{parameter}}}` and `{{macro}}` in `text` using the given
/// parameters.
///
/// Failed macros are replaced by an error marker, or by nothing if the error
/// is not one that readers should see. Unbalanced braces are copied through.
pub fn expand(state: &mut State<'_>, text: &str, params: &Params) -> Result<String> {
    if !text.contains("{{") {
        return Ok(text.to_string());
    }

    if state.nesting >= MAX_NESTING {
        log::warn!("expansion nested too deeply; leaving text unexpanded");
        return Ok(text.to_string());
    }

    state.nesting += 1;
    let mut state = scopeguard::guard(state, |state| state.nesting -= 1);
    expand_text(&mut state, text, params)
}

/// Scans `text` for brace expressions.
fn expand_text(state: &mut State<'_>, text: &str, params: &Params) -> Result<String> {
    let bytes = text.as_bytes();
    let finder = memmem::Finder::new(b"{{");
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = finder.find(&bytes[cursor..]) {
        let start = cursor + found;
        out += &text[cursor..start];
        let run = bytes[start..].iter().take_while(|b| **b == b'{').count();

        // `{{{{{x}}}}}` is a macro whose name is a parameter
        if run >= 5 {
            let open = start + run - 5;
            if let Some(close) = find_close(bytes, open + 2, 2) {
                out += &text[start..open];
                expand_macro(state, &mut out, &text[open..close + 2], params)?;
                cursor = close + 2;
                continue;
            }
        }

        if run >= 3 {
            let open = start + run - 3;
            if let Some(close) = find_close(bytes, open + 3, 3) {
                out += &text[start..open];
                expand_parameter(state, &mut out, &text[open..close + 3], params)?;
                cursor = close + 3;
                continue;
            }
        }

        let open = start + run - 2;
        if let Some(close) = find_close(bytes, open + 2, 2) {
            out += &text[start..open];
            expand_macro(state, &mut out, &text[open..close + 2], params)?;
            cursor = close + 2;
        } else {
            out += "{{";
            cursor = start + 2;
        }
    }

    out += &text[cursor..];
    Ok(out)
}

/// Finds the start of the run of `width` closing braces which balances an
/// expression whose content starts at `from`.
fn find_close(bytes: &[u8], from: usize, width: usize) -> Option<usize> {
    let mut depth = 0_usize;
    let mut index = from;
    while index < bytes.len() {
        match bytes[index] {
            b'{' => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b'}' if bytes[index..].starts_with(&b"}}}"[..width]) => return Some(index),
            _ => {}
        }
        index += 1;
    }
    None
}

/// Expands a `{{{name|default}}}` parameter expression.
fn expand_parameter(
    state: &mut State<'_>,
    out: &mut String,
    raw: &str,
    params: &Params,
) -> Result {
    let inner = &raw[3..raw.len() - 3];
    let parts = split_arguments(inner);
    let name = expand(state, parts[0], params)?;
    if let Some(value) = params.get(ParamKey::new(&name)) {
        *out += value;
    } else if let Some(default) = parts.get(1) {
        *out += &expand(state, default, params)?;
    } else {
        *out += raw;
    }
    Ok(())
}

/// Expands a `{{…}}` macro expression.
fn expand_macro(state: &mut State<'_>, out: &mut String, raw: &str, params: &Params) -> Result {
    let inner = &raw[2..raw.len() - 2];
    let mut buffer = String::new();
    let result = template::classify(state, inner, params)
        .and_then(|invocation| template::invoke(&mut buffer, state, invocation));
    match result {
        Ok(()) => *out += &buffer,
        Err(err) => {
            if let Some(marker) = err.marker() {
                log::debug!("{raw}: {err}");
                *out += &marker;
            } else {
                log::error!("{raw}: {err}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_matching() {
        assert_eq!(find_close(b"{{a}}", 2, 2), Some(3));
        assert_eq!(find_close(b"{{a|{{b}}}}", 2, 2), Some(9));
        assert_eq!(find_close(b"{{{a|{{b}}}}}", 3, 3), Some(10));
        assert_eq!(find_close(b"{{a|{{{1}}}}}", 2, 2), Some(11));
        assert_eq!(find_close(b"{{a", 2, 2), None);
        assert_eq!(find_close(b"{{{a}}", 3, 3), None);
    }
}
