//! End-to-end rendering tests.

use crate::{Context, MemoryStore, Options, Parser, Params, Template, sanitize};

fn store(templates: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (name, content) in templates {
        store.insert(Template::new(*name, *content)).unwrap();
    }
    store
}

fn parser(store: &MemoryStore) -> Parser<'_> {
    let _ = env_logger::try_init();
    Parser::new(
        store,
        store,
        Context::new("Al-Andalus").with_server_host("wiki.example"),
    )
}

#[test]
fn parameters_and_defaults() {
    let store = store(&[]);
    let parser = parser(&store);
    let text = "{{{greeting|Hello}}}, {{{name}}}!";

    let mut params = [("name", "Amir")].into_iter().collect::<Params>();
    assert_eq!(parser.expand(text, &params), "Hello, Amir!");

    params.insert("greeting", "Hi");
    assert_eq!(parser.expand(text, &params), "Hi, Amir!");

    assert_eq!(
        parser.expand("{{{missing}}}", &Params::new()),
        "{{{missing}}}",
        "missing parameters without a default stay literal"
    );
    assert_eq!(
        parser.expand("{{{a|{{{b|deep}}}}}}", &Params::new()),
        "deep",
        "defaults chain"
    );
}

#[test]
fn link_pipes_do_not_split_arguments() {
    let store = store(&[("Infobox", "{{{title}}}/{{{type}}}/{{{1|none}}}")]);
    let parser = parser(&store);
    assert_eq!(
        parser.expand(
            "{{Infobox|title=[[Al-Andalus|Andalusia]]|type=region}}",
            &Params::new()
        ),
        "[[Al-Andalus|Andalusia]]/region/none"
    );
}

#[test]
fn parser_functions() {
    let store = store(&[]);
    let parser = parser(&store);
    let cases = [
        ("{{#if:|yes|no}}", "no"),
        ("{{#if: x |yes|no}}", "yes"),
        ("{{#ifeq:cat|cat|same|diff}}", "same"),
        ("{{#switch:b|a=1|b|c=2|#default=3}}", "2"),
        ("{{#switch:z|a=1|3}}", "3"),
        ("{{#switch:z|a=1|#default=d|last}}", "last"),
        ("{{#switch:z|#default=d|a=1}}", "d"),
        ("{{#switch:a|a=1|#default=d|last}}", "1"),
        ("{{#expr:2+3*4}}", "14"),
        ("{{#expr:1/0}}", ""),
        ("{{#len:héllo}}", "5"),
        ("{{uc:abc}}", "ABC"),
        ("{{PAGENAME}}", "Al-Andalus"),
        ("{{#nope:x}}", "{{Unknown parser function: nope}}"),
    ];
    for (input, expected) in cases {
        assert_eq!(parser.expand(input, &Params::new()), expected, "{input}");
    }
}

#[test]
fn brace_soup() {
    let store = store(&[]);
    let parser = parser(&store);
    let soup = "a {{ b {{{ c }} d";
    assert_eq!(parser.expand(soup, &Params::new()), soup, "unbalanced braces are kept");

    let mut parser = parser;
    let html = parser.parse("{{{{{{ }} text");
    assert!(html.contains("text"), "{html}");
}

#[test]
fn random_brace_soup() {
    use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

    const PIECES: [char; 10] = ['{', '{', '}', '}', '|', '=', 'T', 'a', ' ', '\n'];

    let store = store(&[("T", "{{{1|x}}}{{{2}}}|{{T}}")]);
    let mut parser = parser(&store);
    let mut rng = SmallRng::seed_from_u64(0x0b7a_c3e5);
    for _ in 0..400 {
        let len = rng.random_range(0..64);
        let soup = (0..len)
            .map(|_| PIECES[rng.random_range(0..PIECES.len())])
            .collect::<String>();

        let expanded = parser.expand(&soup, &Params::new());
        assert!(!expanded.contains('\x7f'), "{soup:?}: {expanded:?}");
        let html = parser.parse(&soup);
        assert!(!html.contains('\x7f'), "markers must all be restored for {soup:?}: {html}");
        assert_eq!(sanitize(&html, "wiki.example"), html, "{soup:?}");
    }
}

#[test]
fn recursion() {
    let store = store(&[("Loop", "x{{Loop}}"), ("A", "{{B}}"), ("B", "{{A}}")]);
    let mut parser = parser(&store);

    let html = parser.parse("{{Loop}}");
    assert_eq!(html, "<p>x{{Template recursion detected: Loop}}</p>");

    let html = parser.parse("{{A}}");
    assert!(html.contains("Template recursion detected: A"), "{html}");

    let chain = (0..15)
        .map(|i| (format!("T{i}"), format!("{{{{T{}}}}}", i + 1)))
        .collect::<Vec<_>>();
    let store = MemoryStore::new();
    for (name, content) in &chain {
        store.insert(Template::new(name.as_str(), content.as_str())).unwrap();
    }
    let mut parser = self::parser(&store);
    let html = parser.parse("{{T0}}");
    assert!(html.contains("Template recursion limit exceeded: T10"), "{html}");
}

#[test]
fn missing_templates() {
    let store = store(&[]);
    let mut parser = parser(&store);
    assert_eq!(parser.parse("{{Nope}}"), "<p>{{Template not found: Nope}}</p>");

    let mut parser = self::parser(&store).with_options(Options {
        auto_create_templates: true,
        ..<_>::default()
    });
    let html = parser.parse("{{Brand new}}");
    assert!(html.contains(r#"class="template-placeholder""#), "{html}");
    assert_eq!(store.len(), 1, "placeholder should be stored");
}

#[test]
fn categories() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse("Intro text. [[Category:History]] [[category: Asia |sort]]");
    assert_eq!(html, "<p>Intro text.</p>");
    assert_eq!(parser.categories(), ["History", "Asia"]);

    let html = parser.parse("[[:Category:History]]");
    assert!(html.contains(r#"href="/wiki/category-history""#), "{html}");
    assert!(parser.categories().is_empty(), "collections reset per parse");
}

#[test]
fn references() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse(
        "A<ref>First</ref> B<ref name=\"b\">''Second''</ref> again<ref name=\"b\"/>",
    );

    let refs = parser.references();
    assert_eq!(refs.len(), 2);
    assert_eq!((refs[0].id, refs[0].content.as_str()), (1, "First"));
    assert_eq!((refs[1].id, refs[1].content.as_str()), (2, "<em>Second</em>"));
    assert_eq!(refs[1].name.as_deref(), Some("b"));

    assert!(html.contains(r##"<sup class="reference" id="cite_ref-1"><a href="#cite_note-1">[1]</a></sup>"##), "{html}");
    assert!(html.contains(r#"id="cite_ref-2-1""#), "reused reference gets its own anchor");
    assert!(
        html.ends_with(r##"<div class="wiki-references"><h2>References</h2><ol class="references"><li id="cite_note-1"><a href="#cite_ref-1">^</a> First</li><li id="cite_note-2"><a href="#cite_ref-2">^</a> <em>Second</em></li></ol></div>"##),
        "{html}"
    );
}

#[test]
fn references_placement() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse("A<ref name=\"x\"/>\n\n<references/>\n\nAfter");
    assert!(html.contains("{{Reference not defined: x}}"), "{html}");
    assert!(
        html.find("wiki-references") < html.find("After"),
        "section goes at the references tag: {html}"
    );
}

#[test]
fn tables() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse("{|\n! Name !! Region\n|-\n| [[Cordoba]] || Andalusia\n|-\n|}");
    assert_eq!(
        html,
        r#"<table class="wiki-table"><tr><th>Name</th><th>Region</th></tr><tr><td><a href="/wiki/cordoba" class="wiki-link missing" title="Cordoba">Cordoba</a></td><td>Andalusia</td></tr></table>"#
    );

    let html = parser.parse(
        "{| class=\"data\"\n|+ Cities\n| style=\"color:red\" | a\n{|\n| inner\n|}\n|}",
    );
    assert_eq!(
        html,
        r#"<table class="wiki-table data"><caption>Cities</caption><tr><td style="color:red">a
<table class="wiki-table"><tr><td>inner</td></tr></table></td></tr></table>"#
    );
}

#[test]
fn links() {
    let store = store(&[]);
    store.add_page("Cordoba").unwrap();
    let mut parser = parser(&store);

    let html = parser.parse("[[Cordoba|the city]] and [[Granada#Alhambra palace]] and [[#Notes]]");
    assert_eq!(
        html,
        r##"<p><a href="/wiki/cordoba" class="wiki-link" title="Cordoba">the city</a> and <a href="/wiki/granada#alhambra_palace" class="wiki-link missing" title="Granada">Granada#Alhambra palace</a> and <a href="#notes" class="wiki-link">#Notes</a></p>"##
    );

    let html = parser.parse("[[Cordoba|<b onclick=x>c</b> &amp; d]]");
    assert_eq!(
        html,
        r#"<p><a href="/wiki/cordoba" class="wiki-link" title="Cordoba">&lt;b onclick=x&gt;c&lt;/b&gt; &amp; d</a></p>"#,
        "link text is escaped"
    );

    let html = parser.parse("See [https://other.example/page Other] and [https://wiki.example/x].");
    assert_eq!(
        html,
        r#"<p>See <a href="https://other.example/page" class="external" rel="noopener">Other</a> and <a href="https://wiki.example/x" class="external autonumber">[1]</a>.</p>"#
    );

    let html = parser.parse("[text](/wiki/cordoba) ![alt](javascript:void) `a<b`");
    assert_eq!(
        html,
        r#"<p><a href="/wiki/cordoba">text</a>  <code>a&lt;b</code></p>"#
    );
}

#[test]
fn headings_and_toc() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse("== Early life ==\nText\n== Early life ==\n=== Later ===");
    let ids = parser.headings().iter().map(|h| h.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, ["early_life", "early_life_2", "later"]);
    assert!(html.starts_with(r#"<div class="wiki-toc">"#), "{html}");
    assert!(html.ends_with(
        r#"<h2 id="early_life">Early life</h2>
<p>Text</p>
<h2 id="early_life_2">Early life</h2>
<h3 id="later">Later</h3>"#
    ), "{html}");
    assert!(!parser.table_of_contents().is_empty());

    let html = parser.parse("__NOTOC__\n== A ==\n== B ==\n== C ==");
    assert!(!html.contains("wiki-toc"), "{html}");
    assert!(!parser.toc().enabled);

    let html = parser.parse("Intro\n__TOC__\n== Only ==");
    assert_eq!(
        html,
        r##"<p>Intro</p>
<div class="wiki-toc"><div class="toc-header"><h2>Contents</h2></div><div class="toc-content"><ul class="toc-list"><li class="toc-level-2"><a href="#only">Only</a></li></ul></div></div>
<h2 id="only">Only</h2>"##
    );

    parser.parse("{{TOC limit|2}}\n# Title\n## Part");
    assert_eq!(parser.toc().limit, Some(2));
    let levels = parser.headings().iter().map(|h| h.level).collect::<Vec<_>>();
    assert_eq!(levels, [1, 2], "markdown headings use the number of hashes");
}

#[test]
fn bold_heading_fallback() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse("'''Pillars of Faith'''\nSome text.");
    assert_eq!(html, "<p><strong id=\"pillars_of_faith\">Pillars of Faith</strong>\nSome text.</p>");
    assert_eq!(parser.headings().len(), 1);
    assert_eq!(parser.headings()[0].level, 2);
}

#[test]
fn blocks() {
    let store = store(&[]);
    let mut parser = parser(&store);
    assert_eq!(
        parser.parse("* a\n** b\n* c\n\nText\n----\n; term : detail\n1. one"),
        "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>\n<p>Text</p>\n<hr>\n<dl><dt>term</dt><dd>detail</dd></dl><ol><li>one</li></ol>"
    );
    assert_eq!(
        parser.parse("<nowiki>{{x}} '''y'''</nowiki>"),
        "<p>{{x}} '''y'''</p>"
    );
    assert_eq!(parser.parse("**bold** start"), "<p><strong>bold</strong> start</p>");
}

#[test]
fn modules() {
    let store = store(&[]);
    let mut parser = parser(&store);
    assert_eq!(
        parser.parse("{{#invoke:Hatnote|hatnote|See [[Cordoba]]}}"),
        r#"<div role="note" class="hatnote">See <a href="/wiki/cordoba" class="wiki-link missing" title="Cordoba">Cordoba</a></div>"#
    );
    assert_eq!(
        parser.parse("{{#invoke:Hatnote}}"),
        "<p>{{Module error: missing function name}}</p>"
    );
    assert_eq!(
        parser.parse("{{#invoke:Nope|main}}"),
        "<p>{{Module not implemented: Nope}}</p>"
    );
}

#[test]
fn switches() {
    let store = store(&[("Hidden", "__NOCAT__")]);
    let mut parser = parser(&store);
    let html = parser.parse("__NOTITLE__ {{Hidden}} text __UNKNOWN__");
    assert_eq!(html, "<p>text __UNKNOWN__</p>");
    assert!(parser.switches().no_title);
    assert!(parser.switches().no_category, "switches in templates apply");
}

#[test]
fn sanitized_output() {
    let store = store(&[]);
    let mut parser = parser(&store);
    let html = parser.parse(r#"<img src="x.png" onerror="alert(1)"> <script>alert(1)</script>[[Cordoba]]"#);
    assert_eq!(
        html,
        r#"<p><img src="x.png" loading="lazy"> <a href="/wiki/cordoba" class="wiki-link missing" title="Cordoba">Cordoba</a></p>"#
    );

    let html = parser.parse(r#"<img src="x.png" alt="<" onerror="alert(1)">"#);
    assert_eq!(html, r#"<p><img src="x.png" alt="&lt;" loading="lazy"></p>"#);

    let html = parser.parse("<a href=javascript:alert(1) <b>x</a>");
    assert!(html.contains("&lt;a href=javascript:alert(1) <b>x"), "{html}");
    assert!(!html.contains("<a "), "a broken tag is shown as text: {html}");

    for input in [
        "<a href=\"javascript:alert(1)\">x</a> [//evil.example y]",
        "<scr<script>ipt>alert(1)</script> ''it''",
        "<div onclick=\"x\">{{#if:1|<b onmouseover=y>z</b>}}</div>",
    ] {
        let html = parser.parse(input);
        assert_eq!(sanitize(&html, "wiki.example"), html, "{input}");
        assert!(!html.contains("javascript:"), "{html}");
        assert!(!html.contains("onclick"), "{html}");
    }
}

/// Returns every tag in sanitized output, from `<` to the first `>`.
fn tags(html: &str) -> Vec<&str> {
    html.match_indices('<')
        .map(|(at, _)| {
            let end = html[at..].find('>').map_or(html.len(), |gt| at + gt + 1);
            &html[at..end]
        })
        .collect()
}

#[test]
fn hostile_attributes() {
    let inputs = [
        r#"<img src="x.png" alt="<" onerror="alert(1)">"#,
        "<a href=javascript:alert(1) <b>x</a>",
        r#"<p title='a"b' onclick=x>y</p>"#,
        r#"<div title="x>y" onmouseover="z">t</div>"#,
        "<b title='unterminated>text",
        "<img src=x.png alt=`<` onerror=alert(1)>",
        "<<img src=x.png>img src=x onerror=alert(1)>",
        r#"<a href="&#x6A;avascript:x" title="<a href='javascript:y'>">z</a>"#,
        r#"<span title=">" <script>alert(1)</script>"#,
        "<a href=/ok onclick=x <a href=javascript:y>z</a>",
    ];
    for input in inputs {
        let once = sanitize(input, "wiki.example");
        assert_eq!(sanitize(&once, "wiki.example"), once, "{input}");
        for tag in tags(&once) {
            assert!(tag.ends_with('>'), "every < in {once:?} starts a whole tag");
            assert!(!tag.contains(" on"), "{tag} in {once:?} keeps a handler");
            assert!(!tag.contains("javascript:"), "{tag} in {once:?} keeps a script URL");
        }
    }
}

#[test]
fn parallel_parsers_do_not_share_state() {
    use rayon::prelude::*;

    let store = store(&[("Cat", "[[Category:{{{1}}}]]"), ("Hide", "__NOTITLE__")]);
    let documents = (0..32_usize)
        .into_par_iter()
        .map(|index| {
            let name = format!("Page {index}");
            let parser = Parser::new(&store, &store, Context::new(&name));
            let source = if index % 2 == 0 {
                format!("{{{{Cat|Even{index}}}}} A<ref>Note {index}</ref> {{{{Hide}}}}")
            } else {
                format!("[[Category:Odd{index}]] B")
            };
            (index, parser.parse_document(&source))
        })
        .collect::<Vec<_>>();

    for (index, document) in documents {
        if index % 2 == 0 {
            assert_eq!(document.categories, [format!("Even{index}")]);
            assert_eq!(document.references.len(), 1, "page {index}");
            assert_eq!(document.references[0].content, format!("Note {index}"));
            assert!(document.switches.no_title, "page {index}");
        } else {
            assert_eq!(document.categories, [format!("Odd{index}")]);
            assert!(document.references.is_empty(), "page {index}");
            assert!(!document.switches.no_title, "page {index}");
        }
    }
}
