//! HTML sanitization.
//!
//! The sanitizer is the last thing to touch a rendered document. It does not
//! build a DOM. A quote-aware scanner finds each tag and replaces it with a
//! canonical form rebuilt from its parsed attributes, so markup it does not
//! understand survives as long as it cannot run script. A `<` which does not
//! start a complete tag is escaped. Every pass is repeated until
//! the output stops changing, which makes the sanitizer idempotent and
//! defeats inputs that reassemble a dangerous tag out of the pieces left
//! over from removing another one.

use crate::config::{DANGEROUS_TAGS, EVENT_ATTRIBUTES, IMAGE_EXTENSIONS, LINK_SCHEMES};
use core::fmt::{self, Write as _};
use html_escape::decode_html_entities;
use regex::Regex;
use std::sync::LazyLock;
use unicase::UniCase;
use url::Url;

/// The most rounds a document may take to settle before it is treated as
/// hostile.
const MAX_ROUNDS: usize = 16;

/// Sanitizes an HTML document for display on `host`.
///
/// * Dangerous elements (script, style, embedded content, forms, and
///   document metadata) are removed along with their content.
/// * Every tag is rewritten from its parsed attributes, without any event
///   handler attributes.
/// * Links with an unsafe target are unwrapped. Links to other hosts get
///   `rel="noopener"`.
/// * Images with an unsafe source are removed. The rest are lazy-loaded.
pub fn sanitize(html: &str, host: &str) -> String {
    let mut text = html.to_string();
    for _ in 0..MAX_ROUNDS {
        let next = sanitize_once(&text, host);
        if next == text {
            return next;
        }
        text = next;
    }

    log::warn!("sanitizer did not settle after {MAX_ROUNDS} rounds; escaping document");
    html_escape::encode_text(html).into_owned()
}

/// Elements which never have content or a closing tag.
static VOID_TAGS: phf::Set<&'static str> = phf::phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "source", "track", "wbr",
};

/// A tag found by [`scan_tag`].
struct Tag<'a> {
    /// The lowercased tag name.
    name: String,
    /// The raw text between the tag name and the closing `>`.
    attrs: &'a str,
    /// True for `</name>`.
    closing: bool,
    /// The byte offset just past the closing `>`.
    end: usize,
}

/// Runs one round of tag rewriting.
///
/// Every `<` either starts a well-formed tag, which is replaced by its
/// canonical form or removed, or is escaped to `&lt;`. Text between tags is
/// copied as-is.
fn sanitize_once(html: &str, host: &str) -> String {
    if !html.contains('<') {
        return html.to_string();
    }

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    // One entry per open `<a>`; true if its tags were removed
    let mut anchors = Vec::<bool>::new();
    let mut flushed = 0;
    while let Some(offset) = memchr::memchr(b'<', &bytes[flushed..]) {
        let start = flushed + offset;
        out += &html[flushed..start];

        let Some(tag) = scan_tag(html, start) else {
            out += "&lt;";
            flushed = start + 1;
            continue;
        };
        flushed = tag.end;

        if tag.closing {
            if DANGEROUS_TAGS.contains(tag.name.as_str()) {
                continue;
            }
            if tag.name == "a" && anchors.pop().unwrap_or_default() {
                continue;
            }
            out += "</";
            out += &tag.name;
            out.push('>');
        } else if DANGEROUS_TAGS.contains(tag.name.as_str()) {
            log::debug!("removing <{}> element", tag.name);
            let self_closing = tag.attrs.trim_end().ends_with('/');
            if !self_closing && !VOID_TAGS.contains(tag.name.as_str()) {
                flushed = skip_element(html, &tag);
            }
        } else {
            let rewritten = rewrite_tag(&tag.name, tag.attrs, host);
            if tag.name == "a" {
                anchors.push(rewritten.is_none());
            }
            if let Some(rewritten) = rewritten {
                out += &rewritten;
            }
        }
    }
    out += &html[flushed..];
    out
}

/// Reads the tag starting at the `<` at `start`. Returns `None` if the text
/// there is not a complete tag. Quoted attribute values may contain `<` and
/// `>`; anywhere else inside a tag, `<` means the tag is malformed.
fn scan_tag(html: &str, start: usize) -> Option<Tag<'_>> {
    let bytes = html.as_bytes();
    let mut index = start + 1;
    let closing = bytes.get(index) == Some(&b'/');
    if closing {
        index += 1;
    }

    let name_start = index;
    if !bytes.get(index)?.is_ascii_alphabetic() {
        return None;
    }
    while bytes.get(index).is_some_and(u8::is_ascii_alphanumeric) {
        index += 1;
    }
    let name_end = index;

    let mut quote = None;
    let mut after_equals = false;
    while let Some(&byte) = bytes.get(index) {
        match quote {
            Some(open) => {
                if byte == open {
                    quote = None;
                }
            }
            None => match byte {
                b'"' | b'\'' if after_equals => quote = Some(byte),
                b'>' => {
                    return Some(Tag {
                        name: html[name_start..name_end].to_ascii_lowercase(),
                        attrs: &html[name_end..index],
                        closing,
                        end: index + 1,
                    });
                }
                b'<' => return None,
                _ => {}
            },
        }
        if !byte.is_ascii_whitespace() {
            after_equals = quote.is_none() && byte == b'=';
        }
        index += 1;
    }
    None
}

/// Returns the offset just past the closing tag of the element opened by
/// `tag`. If there is no closing tag, only the opening tag is skipped.
fn skip_element(html: &str, tag: &Tag<'_>) -> usize {
    let rest = html[tag.end..].to_ascii_lowercase();
    let close = format!("</{}", tag.name);
    let mut from = 0;
    while let Some(at) = rest[from..].find(&close).map(|at| from + at) {
        let after = at + close.len();
        if !rest.as_bytes().get(after).is_some_and(u8::is_ascii_alphanumeric) {
            return rest[after..]
                .find('>')
                .map_or(html.len(), |gt| tag.end + after + gt + 1);
        }
        from = after;
    }
    tag.end
}

/// Rewrites one opening tag from its parsed attributes. Returns `None` if
/// the tag must be removed.
fn rewrite_tag(name: &str, raw: &str, host: &str) -> Option<String> {
    let (raw, self_closing) = match raw.trim_end().strip_suffix('/') {
        Some(raw) => (raw, true),
        None => (raw, false),
    };

    let parsed = parse_attributes(raw);
    let find = |key: &str| {
        parsed
            .iter()
            .find(|(attr, _)| attr == key)
            .map(|(_, value)| value.as_str())
    };

    match name {
        "a" if find("href").is_some_and(|href| matches!(classify_url(href), Target::Invalid)) => {
            log::debug!("unwrapping link with unsafe target");
            return None;
        }
        "img" if !find("src").is_some_and(is_valid_image) => {
            log::debug!("removing image with missing or unsafe source");
            return None;
        }
        "input"
            if !find("type")
                .is_some_and(|kind| UniCase::new(kind.trim()) == UniCase::new("checkbox")) =>
        {
            return None;
        }
        _ => {}
    }

    let mut attrs = parsed
        .into_iter()
        .filter(|(attr, value)| is_safe_attribute(attr, value))
        .collect::<Vec<_>>();

    match name {
        "img" => {
            attrs.retain(|(attr, _)| attr != "loading");
            attrs.push(("loading".into(), "lazy".into()));
        }
        "a" => {
            let target = attrs
                .iter()
                .find(|(attr, _)| attr == "href")
                .map(|(_, href)| classify_url(href));
            if let Some(Target::External(url)) = target
                && url.host_str().is_some_and(|url_host| !same_host(url_host, host))
            {
                attrs.retain(|(attr, _)| attr != "rel");
                attrs.push(("rel".into(), "noopener".into()));
            }
        }
        _ => {}
    }

    let mut out = String::with_capacity(raw.len() + name.len() + 3);
    out.push('<');
    out += name;
    write_attributes(&mut out, &attrs).ok()?;
    if self_closing {
        out += " /";
    }
    out.push('>');
    Some(out)
}

/// Returns true if an attribute may be kept.
fn is_safe_attribute(name: &str, value: &str) -> bool {
    if EVENT_ATTRIBUTES.contains(name) || name.starts_with("on") {
        return false;
    }

    match name {
        "href" | "src" | "action" | "formaction" | "xlink:href" | "poster" | "background" => {
            !matches!(classify_url(value), Target::Invalid)
        }
        "style" => {
            let value = value.to_ascii_lowercase();
            !(value.contains("expression") || value.contains("javascript:"))
        }
        _ => true,
    }
}

/// Parses HTML attributes from the text between a tag name and the end of
/// the tag. Names are lowercased and values are entity-decoded. Only the
/// first of any duplicated attribute is kept.
pub(crate) fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    static ATTR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
        )
        .unwrap()
    });
    static NAME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-z_:][a-z0-9_:.-]*$").unwrap());

    let mut attrs = Vec::<(String, String)>::new();
    for captures in ATTR.captures_iter(raw) {
        let name = captures[1].to_ascii_lowercase();
        if !NAME.is_match(&name) || attrs.iter().any(|(seen, _)| *seen == name) {
            continue;
        }
        let value = captures
            .get(2)
            .or_else(|| captures.get(3))
            .or_else(|| captures.get(4))
            .map_or("", |m| m.as_str());
        attrs.push((name, decode_html_entities(value).into_owned()));
    }
    attrs
}

/// Writes attributes in canonical `name="value"` form.
pub(crate) fn write_attributes(out: &mut String, attrs: &[(String, String)]) -> fmt::Result {
    for (name, value) in attrs {
        write!(
            out,
            r#" {name}="{}""#,
            html_escape::encode_double_quoted_attribute(value)
        )?;
    }
    Ok(())
}

/// The kind of target a URL points at.
enum Target {
    /// A relative URL, a path on this site, or a fragment.
    Local,
    /// An absolute URL with an allowed scheme.
    External(Url),
    /// Anything else.
    Invalid,
}

/// Works out what a link target points at.
fn classify_url(raw: &str) -> Target {
    static SCHEME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());

    let url = decode_html_entities(raw)
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .map(|c| if c == '\\' { '/' } else { c })
        .collect::<String>();

    if url.starts_with("//") {
        return match Url::parse(&format!("https:{url}")) {
            Ok(url) if url.host_str().is_some() => Target::External(url),
            _ => Target::Invalid,
        };
    }

    if url.is_empty() || url.starts_with(['/', '#', '?']) || !SCHEME.is_match(&url) {
        return Target::Local;
    }

    match Url::parse(&url) {
        Ok(url) if LINK_SCHEMES.contains(url.scheme()) => {
            if url.scheme() == "mailto" || url.host_str().is_some() {
                Target::External(url)
            } else {
                Target::Invalid
            }
        }
        Ok(url) => {
            log::debug!("rejecting URL with scheme '{}'", url.scheme());
            Target::Invalid
        }
        Err(err) => {
            log::debug!("rejecting unparseable URL: {err}");
            Target::Invalid
        }
    }
}

/// Returns true if `src` is an acceptable image source.
fn is_valid_image(src: &str) -> bool {
    match classify_url(src) {
        Target::Local => !src.trim().is_empty(),
        Target::External(url) => {
            matches!(url.scheme(), "http" | "https")
                && url
                    .path()
                    .rsplit_once('.')
                    .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
        }
        Target::Invalid => false,
    }
}

/// Returns true if `url_host` is the host of the current site. Any port on
/// `host` is ignored.
fn same_host(url_host: &str, host: &str) -> bool {
    let host = host.rsplit_once(':').map_or(host, |(name, port)| {
        if port.bytes().all(|b| b.is_ascii_digit()) {
            name
        } else {
            host
        }
    });
    UniCase::new(url_host) == UniCase::new(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "wiki.example";

    #[test]
    fn dangerous_tags() {
        assert_eq!(sanitize("a<script>alert(1)</script>b", HOST), "ab");
        assert_eq!(sanitize("a<SCRIPT src=x></SCRIPT>b", HOST), "ab");
        assert_eq!(sanitize("a<iframe src=\"x\"/>b", HOST), "ab");
        assert_eq!(
            sanitize("<scr<script></script>ipt>alert(1)</script>", HOST),
            "&lt;script>alert(1)",
            "reassembled tags are escaped"
        );
        assert_eq!(sanitize("a<script>if (a < b) {}</script>b", HOST), "ab");
        assert_eq!(sanitize("a<script>x", HOST), "ax", "unclosed elements lose only the tag");
        assert_eq!(sanitize("<style>p{}</style><p>x</p>", HOST), "<p>x</p>");
        assert_eq!(sanitize("<input type=text>", HOST), "");
        assert_eq!(
            sanitize("<input type=\"checkbox\" checked>", HOST),
            r#"<input type="checkbox" checked="">"#
        );
    }

    #[test]
    fn event_handlers() {
        assert_eq!(
            sanitize(r#"<img src="x.png" onerror="alert(1)">"#, HOST),
            r#"<img src="x.png" loading="lazy">"#
        );
        assert_eq!(
            sanitize(r#"<div ONCLICK='x' onpointerdown=y class="box">t</div>"#, HOST),
            r#"<div class="box">t</div>"#
        );
        assert_eq!(
            sanitize(r#"<span style="width: expression(alert(1))">t</span>"#, HOST),
            "<span>t</span>"
        );
    }

    #[test]
    fn malformed_tags() {
        assert_eq!(
            sanitize(r#"<img src="x.png" alt="<" onerror="alert(1)">"#, HOST),
            r#"<img src="x.png" alt="&lt;" loading="lazy">"#,
            "a quoted < does not end the tag"
        );
        assert_eq!(
            sanitize("<a href=javascript:alert(1) <b>x</a>", HOST),
            "&lt;a href=javascript:alert(1) <b>x</a>",
            "an unquoted < makes the tag text"
        );
        assert_eq!(
            sanitize(r#"<a title="x>y" href="javascript:alert(1)">z</a>"#, HOST),
            "z",
            "a quoted > does not end the tag"
        );
        assert_eq!(
            sanitize(r#"<img src=x.png title=a"b onerror=alert(1)>"#, HOST),
            r#"<img src="x.png" title="a" b="" loading="lazy">"#
        );
        assert_eq!(sanitize("1 < 2 and <3 and </ b>", HOST), "1 &lt; 2 and &lt;3 and &lt;/ b>");
        assert_eq!(sanitize("<b title='open>", HOST), "&lt;b title='open>");
    }

    #[test]
    fn links() {
        assert_eq!(
            sanitize(r#"<a href="https://other.example/x">x</a>"#, HOST),
            r#"<a href="https://other.example/x" rel="noopener">x</a>"#
        );
        assert_eq!(
            sanitize(r#"<a href="//other.example/x" rel="me">x</a>"#, HOST),
            r#"<a href="//other.example/x" rel="noopener">x</a>"#,
            "protocol-relative links are external"
        );
        assert_eq!(
            sanitize(r#"<a href="https://wiki.example/wiki/x">x</a>"#, HOST),
            r#"<a href="https://wiki.example/wiki/x">x</a>"#
        );
        assert_eq!(
            sanitize(r#"<a href="/wiki/al-andalus" class="wiki-link">x</a>"#, HOST),
            r#"<a href="/wiki/al-andalus" class="wiki-link">x</a>"#
        );
        assert_eq!(sanitize("<a href=\"#cite_note-1\">1</a>", HOST), "<a href=\"#cite_note-1\">1</a>");
        assert_eq!(
            sanitize("<a href=\"mailto:a@b.example\">m</a>", HOST),
            "<a href=\"mailto:a@b.example\">m</a>"
        );
        assert_eq!(sanitize(r#"<a href="javascript:alert(1)">x</a>"#, HOST), "x");
        assert_eq!(sanitize("<a href=\"java\tscript:alert(1)\">x</a>", HOST), "x");
        assert_eq!(sanitize(r#"<a href="&#106;avascript:alert(1)">x</a>"#, HOST), "x");
        assert_eq!(sanitize(r#"<a href="data:text/html,x">x</a>"#, HOST), "x");
    }

    #[test]
    fn images() {
        assert_eq!(
            sanitize(r#"<img src="https://cdn.example/a.JPG" loading="eager">"#, HOST),
            r#"<img src="https://cdn.example/a.JPG" loading="lazy">"#
        );
        assert_eq!(sanitize(r#"<img src="https://cdn.example/a.exe">"#, HOST), "");
        assert_eq!(sanitize(r#"<img src="javascript:x">"#, HOST), "");
        assert_eq!(sanitize("<img alt=x>", HOST), "");
        assert_eq!(
            sanitize("<img src=/files/a.png />", HOST),
            r#"<img src="/files/a.png" loading="lazy" />"#
        );
    }

    #[test]
    fn idempotent() {
        let inputs = [
            r#"<p title="a &amp; b" title="dup">x</p>"#,
            r#"<a href="https://x.example" rel="a">y</a><img src=a.png>"#,
            "<scr<script>x</script>ipt>",
            "<<script>script>alert(1)<</script>/script>",
            "1 < 2 > 0 & so on",
            "<a href='x'>unclosed",
            r#"<img src="x.png" alt="<" onerror="alert(1)">"#,
            "<a href=javascript:alert(1) <b>x</a>",
            r#"<div title='"' onclick="a" <p onmouseover=b>c</p>"#,
            "<a href=javascript:x><a href=/ok>y</a></a>",
        ];
        for input in inputs {
            let once = sanitize(input, HOST);
            assert_eq!(sanitize(&once, HOST), once, "{input}");
        }
    }

    #[test]
    fn attributes() {
        assert_eq!(
            parse_attributes(r#" class="a b" ID=x data-v='1' checked title="&lt;" class="c""#),
            [
                ("class".to_string(), "a b".to_string()),
                ("id".into(), "x".into()),
                ("data-v".into(), "1".into()),
                ("checked".into(), String::new()),
                ("title".into(), "<".into()),
            ]
        );
    }
}
