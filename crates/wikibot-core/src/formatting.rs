//! Telegram HTML helpers.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Inline `<code>` span with escaped content.
pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

/// Anchor whose visible text is the URL itself.
pub fn link(url: &str) -> String {
    let escaped = escape_html(url);
    format!("<a href=\"{escaped}\">{escaped}</a>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"AT&T"</b>"#),
            "&lt;b&gt;&quot;AT&amp;T&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn link_escapes_quotes_in_href() {
        assert_eq!(
            link("https://en.wikipedia.org/wiki/\"Quoted\""),
            "<a href=\"https://en.wikipedia.org/wiki/&quot;Quoted&quot;\">https://en.wikipedia.org/wiki/&quot;Quoted&quot;</a>"
        );
        assert_eq!(code("en"), "<code>en</code>");
    }
}
