//! Macro classification and template calls.

use super::{
    Error, Result, State,
    expand_templates::expand,
    magic_words::{self, MagicWord},
    modules,
    parser_fns::{self, ParserFn},
    stack::{Args, Params, check_recursion, split_arguments},
    strip::StripMarkers,
};
use crate::{
    config::FUNCTION_HOOKS,
    title::{slugify, template_name},
};
use regex::Regex;
use std::{rc::Rc, sync::LazyLock};
use unicase::UniCase;

/// A classified `{{…}}` macro.
pub(crate) enum Invocation<'a> {
    /// A variable like `{{PAGENAME}}`.
    MagicWord(MagicWord),
    /// A parser function call like `{{#if:…}}`.
    ParserFunction {
        /// The name of the function, for logging.
        callee: String,
        /// The function.
        func: ParserFn,
        /// The arguments, starting with the text after the colon.
        args: Args<'a>,
    },
    /// A module call like `{{#invoke:Module|function|…}}`.
    ModuleInvoke {
        /// The module name.
        module: String,
        /// The function name, if one was given.
        function: Option<String>,
        /// The arguments after the function name.
        args: Args<'a>,
    },
    /// A template transclusion.
    TemplateCall {
        /// The normalised template name.
        name: String,
        /// The arguments after the template name.
        args: Args<'a>,
    },
    /// The `{{TOC limit|n}}` template.
    TocLimit(Args<'a>),
}

/// Works out what kind of macro `inner`, the text between the braces, is.
pub(crate) fn classify<'a>(
    state: &mut State<'_>,
    inner: &'a str,
    params: &'a Params,
) -> Result<Invocation<'a>> {
    let parts = split_arguments(inner);
    let (head, rest) = (parts[0], &parts[1..]);

    if let Some((prefix, first)) = head.split_once(':') {
        let prefix = prefix.trim();
        let mut raw = Vec::with_capacity(parts.len());
        raw.push(first);
        raw.extend_from_slice(rest);

        if let Some(name) = prefix.strip_prefix('#') {
            let name = name.trim().to_lowercase();
            if name == "invoke" {
                return classify_invoke(state, first, rest, params);
            }
            let key = format!("#{name}");
            return if let Some(func) = parser_fns::lookup(&key) {
                Ok(Invocation::ParserFunction {
                    callee: key,
                    func,
                    args: Args::new(raw, params),
                })
            } else {
                Err(Error::UnknownParserFunction(name))
            };
        }

        let name = prefix.to_lowercase();
        if FUNCTION_HOOKS.contains(name.as_str())
            && let Some(func) = parser_fns::lookup(&name)
        {
            return Ok(Invocation::ParserFunction {
                callee: name,
                func,
                args: Args::new(raw, params),
            });
        }
    }

    let name = expand(state, head, params)?;
    let name = name.trim();
    if rest.is_empty()
        && let Some(word) = magic_words::lookup(name)
    {
        return Ok(Invocation::MagicWord(word));
    }

    let name = template_name(name);
    let args = Args::new(rest.to_vec(), params);
    if UniCase::new(name.as_str()) == UniCase::new("TOC limit") {
        Ok(Invocation::TocLimit(args))
    } else {
        Ok(Invocation::TemplateCall { name, args })
    }
}

/// Classifies an `{{#invoke:…}}` call.
fn classify_invoke<'a>(
    state: &mut State<'_>,
    module: &'a str,
    rest: &[&'a str],
    params: &'a Params,
) -> Result<Invocation<'a>> {
    let module = expand(state, module, params)?.trim().to_string();
    let function = rest
        .first()
        .map(|function| expand(state, function, params))
        .transpose()?
        .map(|function| function.trim().to_string())
        .filter(|function| !function.is_empty());
    let args = rest.get(1..).unwrap_or_default().to_vec();
    Ok(Invocation::ModuleInvoke {
        module,
        function,
        args: Args::new(args, params),
    })
}

/// Runs a classified macro and writes its output to `out`.
pub(crate) fn invoke(out: &mut String, state: &mut State<'_>, invocation: Invocation<'_>) -> Result {
    match invocation {
        Invocation::MagicWord(word) => {
            *out += &magic_words::evaluate(word, state.ctx);
            Ok(())
        }
        Invocation::ParserFunction { callee, func, args } => {
            log::trace!("{{{{{callee}:…}}}} with {} args", args.len());
            func(out, state, &args)
        }
        Invocation::ModuleInvoke {
            module,
            function,
            args,
        } => modules::call_module(out, state, &module, function.as_deref(), &args),
        Invocation::TemplateCall { name, args } => call_template(out, state, &name, &args),
        Invocation::TocLimit(args) => {
            let limit = args.eval_trim(state, 0)?.and_then(|limit| limit.parse::<u8>().ok());
            if let Some(limit) = limit {
                state.toc.limit = Some(limit.clamp(1, 6));
            }
            Ok(())
        }
    }
}

/// Expands a template call.
pub(crate) fn call_template(
    out: &mut String,
    state: &mut State<'_>,
    name: &str,
    args: &Args<'_>,
) -> Result {
    let Some(body) = load(state, name).or_else(|| create_placeholder(state, name)) else {
        return Err(Error::NotFound(name.to_string()));
    };

    check_recursion(state, name)?;

    let params = args.to_params(state, 0)?;
    let params = args.caller_params().merged(params);

    state.stack.push(name.to_string());
    let mut state = scopeguard::guard(state, |state| {
        state.stack.pop();
    });

    let text = expand(&mut state, &body, &params)?;
    *out += &magic_words::apply_switches(&mut state, &text);
    Ok(())
}

/// Loads and prepares the body of a template. Hits and misses are both
/// cached for the rest of the document.
fn load(state: &mut State<'_>, name: &str) -> Option<Rc<str>> {
    if let Some(cached) = state.templates.get(name) {
        return cached.clone();
    }

    let keys = [name.to_string(), name.replace(' ', "_"), slugify(name)];
    let template = keys.iter().find_map(|key| {
        state.store.lookup(key).unwrap_or_else(|err| {
            log::warn!("template lookup for '{key}' failed: {err}");
            None
        })
    });

    let body = template.map(|template| Rc::from(prepare_body(&mut state.strip, &template.content)));
    if body.is_none() {
        log::debug!("template '{name}' not found");
    }
    state.templates.insert(name.to_string(), body.clone());
    body
}

/// Asks the store for a stub template, if the options allow it.
fn create_placeholder(state: &mut State<'_>, name: &str) -> Option<Rc<str>> {
    if !state.options.auto_create_templates {
        return None;
    }

    match state.store.ensure_placeholder(name) {
        Ok(template) => {
            let body = Rc::<str>::from(prepare_body(&mut state.strip, &template.content));
            state.templates.insert(name.to_string(), Some(Rc::clone(&body)));
            Some(body)
        }
        Err(err) => {
            log::warn!("could not create placeholder for '{name}': {err}");
            None
        }
    }
}

/// Applies transclusion-mode inclusion control to a template body.
fn prepare_body(strip: &mut StripMarkers, content: &str) -> String {
    static ONLY_INCLUDE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<onlyinclude\s*>(.*?)</onlyinclude\s*>").unwrap());
    static NO_INCLUDE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<noinclude\s*>.*?(?:</noinclude\s*>|$)").unwrap());
    static INCLUDE_ONLY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)</?includeonly\s*>").unwrap());

    let text = strip.lift_verbatim(content);
    let text = if ONLY_INCLUDE.is_match(&text) {
        ONLY_INCLUDE
            .captures_iter(&text)
            .map(|captures| captures[1].to_string())
            .collect::<String>()
    } else {
        text
    };
    let text = NO_INCLUDE.replace_all(&text, "");
    INCLUDE_ONLY.replace_all(&text, "").into_owned()
}
