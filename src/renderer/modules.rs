//! Built-in replacements for the script modules that templates commonly
//! `#invoke`.

use super::{
    Error, Result, State,
    stack::{Args, Params, check_recursion},
};
use core::fmt::Write as _;
use unicase::UniCase;

/// The function signature of a module function.
type ModuleFn = fn(&mut String, &Params) -> Result;

/// Known modules and their functions. Names are matched case-insensitively.
static MODULES: &[(&str, &[(&str, ModuleFn)])] = &[
    ("Protection banner", &[("main", protection_banner as ModuleFn)]),
    (
        "Hatnote",
        &[("hatnote", hatnote as ModuleFn), ("main", hatnote)],
    ),
];

/// Calls a module function.
pub(crate) fn call_module(
    out: &mut String,
    state: &mut State<'_>,
    module: &str,
    function: Option<&str>,
    args: &Args<'_>,
) -> Result {
    let module = module
        .split_once(':')
        .filter(|(prefix, _)| UniCase::new(prefix.trim()) == UniCase::new("Module"))
        .map_or(module, |(_, name)| name.trim());

    let Some((name, functions)) = MODULES
        .iter()
        .find(|(name, _)| UniCase::new(*name) == UniCase::new(module))
    else {
        return Err(Error::UnknownModule(module.to_string()));
    };

    let function = function.ok_or(Error::MissingFunctionName)?;
    let Some((_, module_fn)) = functions
        .iter()
        .find(|(fn_name, _)| UniCase::new(*fn_name) == UniCase::new(function))
    else {
        return Err(Error::UnknownModule(format!("{name}|{function}")));
    };

    let frame = format!("Module:{name}");
    check_recursion(state, &frame)?;
    let params = args.to_params(state, 0)?;

    state.stack.push(frame);
    let _state = scopeguard::guard(state, |state| {
        state.stack.pop();
    });
    module_fn(out, &params)
}

/// `{{#invoke:Protection banner|main|action=edit|level=semi-indef}}`
fn protection_banner(out: &mut String, params: &Params) -> Result {
    let action = params.get("action").unwrap_or("edit").to_ascii_lowercase();
    let level = params.get("level").unwrap_or_default().to_ascii_lowercase();
    let (class, description, who) = if action == "move" {
        (
            "move-protection",
            "move-protected",
            "Only administrators can move it.",
        )
    } else if level.starts_with("semi") {
        (
            "semi-protection",
            "semi-protected",
            "Only registered users can edit it.",
        )
    } else if level.starts_with("full") || level.starts_with("sysop") {
        (
            "full-protection",
            "fully protected",
            "Only administrators can edit it.",
        )
    } else if level.starts_with("extended") || level.starts_with("ecp") {
        (
            "extended-protection",
            "extended-protected",
            "Only extended confirmed users can edit it.",
        )
    } else {
        ("protection", "protected", "")
    };

    let level = level
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>();
    write!(out, r#"<div class="protection-template {class}"#)?;
    if !level.is_empty() {
        write!(out, " {level}")?;
    }
    write!(
        out,
        r#""><div class="protection-banner"><strong>This page is {description}.</strong>"#
    )?;
    if !who.is_empty() {
        write!(out, " {who}")?;
    }
    write!(out, "</div></div>")?;
    Ok(())
}

/// `{{#invoke:Hatnote|hatnote|text}}`
fn hatnote(out: &mut String, params: &Params) -> Result {
    let text = params.get(1_usize).unwrap_or_default();
    write!(out, r#"<div role="note" class="hatnote">{text}</div>"#)?;
    Ok(())
}
