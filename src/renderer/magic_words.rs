//! Magic variables and double-underscore behaviour switches.
//!
//! <https://www.mediawiki.org/wiki/Help:Magic_words>

use super::{State, TOC_SENTINEL, TocPosition};
use crate::{
    common::{format_date, url_encode},
    config::{BEHAVIOR_SWITCHES, VERSION},
    context::Context,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use time::UtcOffset;

/// A site counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Counter {
    /// Content pages.
    Articles,
    /// Uploaded files.
    Files,
    /// Edits.
    Edits,
    /// Page views.
    Views,
    /// Registered users.
    Users,
    /// Administrators.
    Admins,
    /// Pages of any kind.
    Pages,
}

/// A page name variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PageName {
    /// The title without namespace.
    Page,
    /// The title with namespace.
    Full,
    /// Everything but the last subpage.
    Base,
    /// The first subpage.
    Root,
    /// The last subpage.
    Sub,
    /// The associated talk page.
    Talk,
    /// The associated subject page.
    Subject,
}

/// A magic variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MagicWord {
    /// The current UTC time in the given `date()` format.
    Current(&'static str),
    /// The current local time in the given `date()` format.
    Local(&'static str),
    /// The ISO week number of the current time, without padding.
    Week,
    /// The revision time in the given `date()` format.
    Revision(&'static str),
    /// A page name, optionally URL-encoded.
    PageName(PageName, bool),
    /// The name of the wiki.
    SiteName,
    /// The base URL of the server.
    Server,
    /// The host name of the server.
    ServerName,
    /// The script path, which is always empty.
    ScriptPath,
    /// The style path.
    StylePath,
    /// The engine version.
    Version,
    /// The ID of the revision being rendered.
    RevisionId,
    /// The user who saved the revision being rendered.
    RevisionUser,
    /// The content language code.
    Language,
    /// The writing direction mark.
    DirectionMark,
    /// A fixed writing direction.
    Direction(&'static str),
    /// A site counter.
    Statistic(Counter),
    /// The namespace name of the current page, optionally URL-encoded.
    Namespace(bool),
    /// The namespace number of the current page.
    NamespaceNumber,
    /// The talk namespace of the current page.
    TalkSpace,
    /// The subject namespace of the current page.
    SubjectSpace,
    /// A literal string.
    Literal(&'static str),
}

/// Known magic variables.
static MAGIC_WORDS: phf::Map<&'static str, MagicWord> = phf::phf_map! {
    "CURRENTYEAR" => MagicWord::Current("Y"),
    "CURRENTMONTH" => MagicWord::Current("m"),
    "CURRENTMONTH1" => MagicWord::Current("n"),
    "CURRENTMONTH2" => MagicWord::Current("m"),
    "CURRENTMONTHNAME" => MagicWord::Current("F"),
    "CURRENTMONTHNAMEGEN" => MagicWord::Current("F"),
    "CURRENTMONTHABBREV" => MagicWord::Current("M"),
    "CURRENTDAY" => MagicWord::Current("j"),
    "CURRENTDAY2" => MagicWord::Current("d"),
    "CURRENTDAYNAME" => MagicWord::Current("l"),
    "CURRENTDOW" => MagicWord::Current("w"),
    "CURRENTTIME" => MagicWord::Current("H:i"),
    "CURRENTHOUR" => MagicWord::Current("H"),
    "CURRENTWEEK" => MagicWord::Week,
    "CURRENTTIMESTAMP" => MagicWord::Current("YmdHis"),

    "LOCALYEAR" => MagicWord::Local("Y"),
    "LOCALMONTH" => MagicWord::Local("m"),
    "LOCALMONTH1" => MagicWord::Local("n"),
    "LOCALMONTH2" => MagicWord::Local("m"),
    "LOCALMONTHNAME" => MagicWord::Local("F"),
    "LOCALMONTHNAMEGEN" => MagicWord::Local("F"),
    "LOCALMONTHABBREV" => MagicWord::Local("M"),
    "LOCALDAY" => MagicWord::Local("j"),
    "LOCALDAY2" => MagicWord::Local("d"),
    "LOCALDAYNAME" => MagicWord::Local("l"),
    "LOCALDOW" => MagicWord::Local("w"),
    "LOCALTIME" => MagicWord::Local("H:i"),
    "LOCALHOUR" => MagicWord::Local("H"),
    "LOCALWEEK" => MagicWord::Week,
    "LOCALTIMESTAMP" => MagicWord::Local("YmdHis"),

    "REVISIONDAY" => MagicWord::Revision("j"),
    "REVISIONDAY2" => MagicWord::Revision("d"),
    "REVISIONMONTH" => MagicWord::Revision("m"),
    "REVISIONMONTH1" => MagicWord::Revision("n"),
    "REVISIONYEAR" => MagicWord::Revision("Y"),
    "REVISIONTIMESTAMP" => MagicWord::Revision("YmdHis"),
    "REVISIONID" => MagicWord::RevisionId,
    "REVISIONUSER" => MagicWord::RevisionUser,

    "PAGENAME" => MagicWord::PageName(PageName::Page, false),
    "PAGENAMEE" => MagicWord::PageName(PageName::Page, true),
    "FULLPAGENAME" => MagicWord::PageName(PageName::Full, false),
    "FULLPAGENAMEE" => MagicWord::PageName(PageName::Full, true),
    "BASEPAGENAME" => MagicWord::PageName(PageName::Base, false),
    "BASEPAGENAMEE" => MagicWord::PageName(PageName::Base, true),
    "ROOTPAGENAME" => MagicWord::PageName(PageName::Root, false),
    "ROOTPAGENAMEE" => MagicWord::PageName(PageName::Root, true),
    "SUBPAGENAME" => MagicWord::PageName(PageName::Sub, false),
    "SUBPAGENAMEE" => MagicWord::PageName(PageName::Sub, true),
    "TALKPAGENAME" => MagicWord::PageName(PageName::Talk, false),
    "TALKPAGENAMEE" => MagicWord::PageName(PageName::Talk, true),
    "SUBJECTPAGENAME" => MagicWord::PageName(PageName::Subject, false),
    "SUBJECTPAGENAMEE" => MagicWord::PageName(PageName::Subject, true),
    "ARTICLEPAGENAME" => MagicWord::PageName(PageName::Subject, false),
    "ARTICLEPAGENAMEE" => MagicWord::PageName(PageName::Subject, true),

    "SITENAME" => MagicWord::SiteName,
    "SERVER" => MagicWord::Server,
    "SERVERNAME" => MagicWord::ServerName,
    "SCRIPTPATH" => MagicWord::ScriptPath,
    "STYLEPATH" => MagicWord::StylePath,
    "CURRENTVERSION" => MagicWord::Version,
    "CONTENTLANGUAGE" => MagicWord::Language,
    "CONTENTLANG" => MagicWord::Language,
    "PAGELANGUAGE" => MagicWord::Language,
    "DIRECTIONMARK" => MagicWord::DirectionMark,
    "DIRMARK" => MagicWord::DirectionMark,
    "DIRLTR" => MagicWord::Direction("ltr"),
    "DIRRTL" => MagicWord::Direction("rtl"),

    "NUMBEROFARTICLES" => MagicWord::Statistic(Counter::Articles),
    "NUMBEROFFILES" => MagicWord::Statistic(Counter::Files),
    "NUMBEROFEDITS" => MagicWord::Statistic(Counter::Edits),
    "NUMBEROFVIEWS" => MagicWord::Statistic(Counter::Views),
    "NUMBEROFUSERS" => MagicWord::Statistic(Counter::Users),
    "NUMBEROFADMINS" => MagicWord::Statistic(Counter::Admins),
    "NUMBEROFPAGES" => MagicWord::Statistic(Counter::Pages),

    "NAMESPACE" => MagicWord::Namespace(false),
    "NAMESPACEE" => MagicWord::Namespace(true),
    "NAMESPACENUMBER" => MagicWord::NamespaceNumber,
    "TALKSPACE" => MagicWord::TalkSpace,
    "SUBJECTSPACE" => MagicWord::SubjectSpace,
    "ARTICLESPACE" => MagicWord::SubjectSpace,

    "!" => MagicWord::Literal("|"),
    "=" => MagicWord::Literal("="),
};

/// Finds the magic variable with the given name. Names are case-sensitive.
pub(crate) fn lookup(name: &str) -> Option<MagicWord> {
    MAGIC_WORDS.get(name).copied()
}

/// Evaluates a magic variable.
pub(crate) fn evaluate(word: MagicWord, ctx: &Context) -> String {
    match word {
        MagicWord::Current(format) => format_date(ctx.now.to_offset(UtcOffset::UTC), format),
        MagicWord::Local(format) => format_date(ctx.now, format),
        MagicWord::Week => ctx.now.iso_week().to_string(),
        MagicWord::Revision(format) => format_date(ctx.revision_time(), format),
        MagicWord::PageName(which, encode) => {
            let title = &ctx.title;
            let name = match which {
                PageName::Page => title.text().to_string(),
                PageName::Full => title.full_text(),
                PageName::Base => title.base_text().to_string(),
                PageName::Root => title.root_text().to_string(),
                PageName::Sub => title.sub_page_text().to_string(),
                PageName::Talk => title.talk_page(),
                PageName::Subject => title.subject_page(),
            };
            if encode {
                url_encode(&name.replace(' ', "_")).to_string()
            } else {
                html_escape::encode_text(&name).into_owned()
            }
        }
        MagicWord::SiteName => html_escape::encode_text(&ctx.site_name).into_owned(),
        MagicWord::Server => format!("{}://{}", ctx.server_scheme, ctx.server_host),
        MagicWord::ServerName => ctx.server_host.clone(),
        MagicWord::ScriptPath => String::new(),
        MagicWord::StylePath => "/skins".to_string(),
        MagicWord::Version => VERSION.to_string(),
        MagicWord::RevisionId => ctx.revision_id.to_string(),
        MagicWord::RevisionUser => ctx
            .user
            .as_deref()
            .map(|user| html_escape::encode_text(user).into_owned())
            .unwrap_or_default(),
        MagicWord::Language => ctx.language.clone(),
        MagicWord::DirectionMark => "\u{200e}".to_string(),
        MagicWord::Direction(direction) | MagicWord::Literal(direction) => direction.to_string(),
        MagicWord::Statistic(counter) => {
            let stats = &ctx.statistics;
            match counter {
                Counter::Articles => stats.articles,
                Counter::Files => stats.files,
                Counter::Edits => stats.edits,
                Counter::Views => stats.views,
                Counter::Users => stats.users,
                Counter::Admins => stats.admins,
                Counter::Pages => stats.pages,
            }
            .to_string()
        }
        MagicWord::Namespace(encode) => {
            let name = ctx.title.namespace().name;
            if encode {
                name.replace(' ', "_")
            } else {
                name.to_string()
            }
        }
        MagicWord::NamespaceNumber => ctx.title.namespace().id.to_string(),
        MagicWord::TalkSpace => ctx.title.namespace().talk().name.to_string(),
        MagicWord::SubjectSpace => ctx.title.namespace().subject().name.to_string(),
    }
}

/// Records and removes `__SWITCH__` behaviour switches in `text`.
///
/// The first `__TOC__` in a document is replaced by a sentinel which marks
/// where the table of contents goes. Unknown switches are left alone.
pub(crate) fn apply_switches(state: &mut State<'_>, text: &str) -> String {
    static SWITCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__([A-Z]+)__").unwrap());

    if !text.contains("__") {
        return text.to_string();
    }

    SWITCH
        .replace_all(text, |captures: &Captures<'_>| {
            let name = &captures[1];
            match name {
                "NOTOC" => state.toc.enabled = false,
                "FORCETOC" => state.toc.forced = true,
                "TOC" => {
                    if state.toc.position != TocPosition::Manual {
                        state.toc.position = TocPosition::Manual;
                        return TOC_SENTINEL.to_string();
                    }
                }
                "NOTITLE" => state.switches.no_title = true,
                "NOCAT" => state.switches.no_category = true,
                name if BEHAVIOR_SWITCHES.contains(name) => {}
                _ => return captures[0].to_string(),
            }
            log::trace!("switch __{name}__");
            String::new()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn context() -> Context {
        Context::new("Help:History/Al-Andalus")
            .with_now(datetime!(2024-03-05 14:07:09 +03:00))
            .with_site_name("Test & Wiki")
            .with_server_host("wiki.example")
            .with_user("Amir")
    }

    #[test]
    fn dates() {
        let ctx = context();
        let eval = |name| evaluate(lookup(name).unwrap(), &ctx);
        assert_eq!(eval("CURRENTYEAR"), "2024");
        assert_eq!(eval("CURRENTMONTH"), "03", "month is zero-padded");
        assert_eq!(eval("CURRENTMONTH1"), "3");
        assert_eq!(eval("CURRENTMONTHNAME"), "March");
        assert_eq!(eval("CURRENTMONTHABBREV"), "Mar");
        assert_eq!(eval("CURRENTDAY"), "5");
        assert_eq!(eval("CURRENTDAY2"), "05");
        assert_eq!(eval("CURRENTDAYNAME"), "Tuesday");
        assert_eq!(eval("CURRENTDOW"), "2");
        assert_eq!(eval("CURRENTTIME"), "11:07", "current time is UTC");
        assert_eq!(eval("LOCALTIME"), "14:07");
        assert_eq!(eval("CURRENTWEEK"), "10");
        assert_eq!(eval("CURRENTTIMESTAMP"), "20240305110709");
        assert_eq!(
            eval("REVISIONYEAR"),
            "2024",
            "revision time defaults to now"
        );
    }

    #[test]
    fn names() {
        let ctx = context();
        let eval = |name| evaluate(lookup(name).unwrap(), &ctx);
        assert_eq!(eval("PAGENAME"), "History/Al-Andalus");
        assert_eq!(eval("FULLPAGENAME"), "Help:History/Al-Andalus");
        assert_eq!(eval("BASEPAGENAME"), "History");
        assert_eq!(eval("SUBPAGENAME"), "Al-Andalus");
        assert_eq!(eval("TALKPAGENAME"), "Help talk:History/Al-Andalus");
        assert_eq!(eval("TALKPAGENAMEE"), "Help_talk:History/Al-Andalus");
        assert_eq!(eval("NAMESPACE"), "Help");
        assert_eq!(eval("NAMESPACENUMBER"), "12");
        assert_eq!(eval("TALKSPACE"), "Help talk");
        assert_eq!(eval("SITENAME"), "Test &amp; Wiki");
        assert_eq!(eval("SERVER"), "https://wiki.example");
        assert_eq!(eval("SERVERNAME"), "wiki.example");
        assert_eq!(eval("REVISIONUSER"), "Amir");
        assert_eq!(eval("!"), "|");
        assert!(lookup("pagename").is_none(), "names are case-sensitive");
        assert!(lookup("Infobox").is_none());
    }
}
