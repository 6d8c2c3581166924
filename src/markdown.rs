use pulldown_cmark::{html, Event, Options, Parser, Tag};

/// Converts markdown to HTML, appending the result to `out`.
pub fn to_html(out: &mut String, markdown: &str) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    html::push_html(out, Parser::new_ext(markdown, options).map(demote));
}

/// Escapes `text` for inclusion in HTML element content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // writing into a `String` can't fail
    let _ = pulldown_cmark::escape::escape_html(&mut out, text);
    out
}

// The post title is the page's top heading, so a `#` in the post body needs to
// be subordinate to it: `#` becomes h2, `##` becomes h3, and so on.
fn demote(ev: Event) -> Event {
    match ev {
        Event::Start(Tag::Heading(level)) => {
            Event::Start(Tag::Heading((level + 1).min(6)))
        }
        Event::End(Tag::Heading(level)) => {
            Event::End(Tag::Heading((level + 1).min(6)))
        }
        _ => ev,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_headings_are_demoted() {
        let mut out = String::new();
        to_html(&mut out, "# Title\n\n###### Deep\n");
        assert_eq!(out, "<h2>Title</h2>\n<h6>Deep</h6>\n");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }
}
