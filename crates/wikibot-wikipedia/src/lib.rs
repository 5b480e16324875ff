//! Wikipedia adapter (MediaWiki Action API).
//!
//! Implements the `wikibot-core` [`LookupClient`] port. The language is part of
//! every request URL, so the client holds no per-language state and is safe to
//! call concurrently.

use std::{
    collections::HashSet,
    sync::OnceLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use wikibot_core::{
    errors::Error,
    lookup::{LookupClient, SearchResults, SummaryOutcome},
    Result,
};

const SEARCH_LIMIT: usize = 10;
const DISAMBIGUATION_OPTION_LIMIT: usize = 20;
/// MediaWiki caps `exsentences` at 10.
const MAX_EXTRACT_SENTENCES: usize = 10;

#[derive(Clone, Debug)]
pub struct WikipediaClient {
    http: reqwest::Client,
}

impl WikipediaClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::External(format!("wikipedia client build error: {e}")))?;
        Ok(Self { http })
    }

    async fn query<T: DeserializeOwned>(&self, lang: &str, params: &[(&str, &str)]) -> Result<T> {
        self.request(lang, "query", params).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        lang: &str,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = api_url(lang)?;
        debug!(lang = %lang, action, ?params, "wikipedia request");

        let resp = self
            .http
            .get(&url)
            .query(&[("action", action), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::External(format!("wikipedia request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "wikipedia request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::External(format!("wikipedia json error: {e}")))
    }

    /// Articles listed on a disambiguation page, in the order the page shows them.
    async fn disambiguation_options(&self, lang: &str, title: &str) -> Result<Vec<String>> {
        let resp: ParseResponse = self
            .request(
                lang,
                "parse",
                &[("page", title), ("prop", "text|links"), ("redirects", "1")],
            )
            .await?;
        Ok(options_in_page_order(resp.parse))
    }
}

#[async_trait]
impl LookupClient for WikipediaClient {
    async fn search(&self, lang: &str, query: &str) -> Result<SearchResults> {
        let limit = SEARCH_LIMIT.to_string();
        let resp: SearchResponse = self
            .query(
                lang,
                &[
                    ("list", "search"),
                    ("srsearch", query),
                    ("srlimit", limit.as_str()),
                    ("srinfo", "suggestion"),
                    ("srprop", ""),
                ],
            )
            .await?;
        Ok(search_results(resp))
    }

    async fn summary(&self, lang: &str, title: &str, max_sentences: usize) -> Result<SummaryOutcome> {
        let sentences = max_sentences.clamp(1, MAX_EXTRACT_SENTENCES).to_string();
        let resp: PagesResponse = self
            .query(
                lang,
                &[
                    ("prop", "extracts|pageprops"),
                    ("ppprop", "disambiguation"),
                    ("exintro", "1"),
                    ("explaintext", "1"),
                    ("exsentences", sentences.as_str()),
                    ("redirects", "1"),
                    ("titles", title),
                ],
            )
            .await?;

        match classify_summary(resp) {
            PageSummary::Missing => Ok(SummaryOutcome::NotFound),
            PageSummary::Extract(text) => Ok(SummaryOutcome::Summary(text)),
            PageSummary::Disambiguation(page_title) => {
                let options = self.disambiguation_options(lang, &page_title).await?;
                Ok(SummaryOutcome::Disambiguation(options))
            }
        }
    }

    async fn canonical_link(&self, lang: &str, title: &str) -> Result<Option<String>> {
        let resp: PagesResponse = self
            .query(
                lang,
                &[("prop", "info"), ("inprop", "url"), ("redirects", "1"), ("titles", title)],
            )
            .await?;
        Ok(page_url(resp, lang))
    }
}

/// Language codes end up in the host name, so only `[a-z0-9-]` is accepted.
fn api_url(lang: &str) -> Result<String> {
    let valid = !lang.is_empty()
        && lang.len() <= 16
        && lang
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(Error::External(format!("invalid wikipedia language: {lang:?}")));
    }
    Ok(format!("https://{lang}.wikipedia.org/w/api.php"))
}

// ============== Response shapes (formatversion=2) ==============

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    searchinfo: Option<SearchInfo>,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchInfo {
    #[serde(default)]
    suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct PagesResponse {
    #[serde(default)]
    query: PagesQuery,
}

#[derive(Debug, Default, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    fullurl: Option<String>,
    #[serde(default)]
    canonicalurl: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    parse: ParsedPage,
}

#[derive(Debug, Default, Deserialize)]
struct ParsedPage {
    /// Rendered page HTML.
    #[serde(default)]
    text: String,
    #[serde(default)]
    links: Vec<ParsedLink>,
}

#[derive(Debug, Deserialize)]
struct ParsedLink {
    ns: i64,
    title: String,
}

impl Page {
    fn exists(&self) -> bool {
        !self.missing && !self.invalid
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PageSummary {
    Missing,
    Extract(String),
    /// Carries the resolved page title (after redirects).
    Disambiguation(String),
}

fn search_results(resp: SearchResponse) -> SearchResults {
    SearchResults {
        titles: resp.query.search.into_iter().map(|h| h.title).collect(),
        suggestion: resp
            .query
            .searchinfo
            .and_then(|i| i.suggestion)
            .filter(|s| !s.trim().is_empty()),
    }
}

fn classify_summary(resp: PagesResponse) -> PageSummary {
    let Some(page) = resp.query.pages.into_iter().next() else {
        return PageSummary::Missing;
    };
    if !page.exists() {
        return PageSummary::Missing;
    }
    let is_disambiguation = page
        .pageprops
        .as_ref()
        .map(|p| p.contains_key("disambiguation"))
        .unwrap_or(false);
    if is_disambiguation {
        return PageSummary::Disambiguation(page.title);
    }
    match page.extract {
        Some(text) if !text.trim().is_empty() => PageSummary::Extract(text.trim().to_string()),
        _ => PageSummary::Missing,
    }
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<li\b[^>]*>(.*?)</li>").expect("valid regex"))
}

fn article_anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<a\b[^>]*\bhref="/wiki/[^"]*"[^>]*\btitle="([^"]*)""#).expect("valid regex")
    })
}

/// First main-namespace link of every list item, in document order.
///
/// The link table of the parse result is sorted by title, so it only decides
/// which anchors are articles. It is used as the order of last resort when the
/// page has no list items.
fn options_in_page_order(page: ParsedPage) -> Vec<String> {
    let articles: HashSet<&str> = page
        .links
        .iter()
        .filter(|l| l.ns == 0)
        .map(|l| l.title.as_str())
        .collect();

    let mut options: Vec<String> = Vec::new();
    for item in list_item_re().captures_iter(&page.text) {
        let body = item.get(1).map_or("", |m| m.as_str());
        let first = article_anchor_re()
            .captures_iter(body)
            .filter_map(|a| a.get(1).map(|t| unescape_html(t.as_str())))
            .find(|t| articles.contains(t.as_str()));
        if let Some(title) = first {
            if !options.contains(&title) {
                options.push(title);
            }
        }
        if options.len() >= DISAMBIGUATION_OPTION_LIMIT {
            break;
        }
    }

    if options.is_empty() {
        options = page
            .links
            .iter()
            .filter(|l| l.ns == 0)
            .take(DISAMBIGUATION_OPTION_LIMIT)
            .map(|l| l.title.clone())
            .collect();
    }
    options
}

fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn page_url(resp: PagesResponse, lang: &str) -> Option<String> {
    let page = resp.query.pages.into_iter().next()?;
    if !page.exists() {
        return None;
    }
    page.fullurl.or(page.canonicalurl).or_else(|| {
        Some(format!(
            "https://{lang}.wikipedia.org/wiki/{}",
            page.title.replace(' ', "_")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(json: &str) -> PagesResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn api_url_rejects_hostile_languages() {
        assert_eq!(
            api_url("en").unwrap(),
            "https://en.wikipedia.org/w/api.php"
        );
        assert!(api_url("zh-yue").is_ok());
        assert!(api_url("").is_err());
        assert!(api_url("evil.com/").is_err());
        assert!(api_url("EN").is_err());
    }

    #[test]
    fn parses_search_hits_and_suggestion() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"batchcomplete":true,"query":{"searchinfo":{"suggestion":"albert einstein"},
                "search":[{"ns":0,"title":"Einstein"},{"ns":0,"title":"Einsteinium"}]}}"#,
        )
        .unwrap();
        let results = search_results(resp);
        assert_eq!(results.titles, vec!["Einstein", "Einsteinium"]);
        assert_eq!(results.suggestion.as_deref(), Some("albert einstein"));
    }

    #[test]
    fn empty_search_has_no_suggestion() {
        let resp: SearchResponse =
            serde_json::from_str(r#"{"query":{"searchinfo":{},"search":[]}}"#).unwrap();
        assert_eq!(search_results(resp), SearchResults::default());
    }

    #[test]
    fn classifies_extract_missing_and_disambiguation() {
        assert_eq!(
            classify_summary(pages(
                r#"{"query":{"pages":[{"pageid":1,"title":"Rust","extract":"Rust is an iron oxide. "}]}}"#
            )),
            PageSummary::Extract("Rust is an iron oxide.".to_string())
        );
        assert_eq!(
            classify_summary(pages(
                r#"{"query":{"pages":[{"ns":0,"title":"Qwzx","missing":true}]}}"#
            )),
            PageSummary::Missing
        );
        assert_eq!(
            classify_summary(pages(
                r#"{"query":{"pages":[{"pageid":2,"title":"Mercury","extract":"Mercury may refer to:",
                    "pageprops":{"disambiguation":""}}]}}"#
            )),
            PageSummary::Disambiguation("Mercury".to_string())
        );
    }

    fn parsed(json: &str) -> ParsedPage {
        serde_json::from_str::<ParseResponse>(json).unwrap().parse
    }

    #[test]
    fn disambiguation_options_follow_page_not_link_table() {
        // The link table is alphabetical; the page lists the planet first.
        let page = parsed(
            r#"{"parse":{"title":"Mercury","pageid":19694,
                "text":"<div class=\"mw-parser-output\"><p><b>Mercury</b> may refer to:</p><ul><li><a href=\"/wiki/Mercury_(planet)\" title=\"Mercury (planet)\">Mercury (planet)</a>, the closest planet to the Sun</li><li><a href=\"/wiki/Mercury_(element)\" title=\"Mercury (element)\">Mercury (element)</a>, a chemical element</li></ul><h2>See also</h2><ul><li><a href=\"/wiki/Help:Disambiguation\" title=\"Help:Disambiguation\">Help</a></li><li><a href=\"/wiki/Freddie_Mercury\" title=\"Freddie Mercury\">Freddie Mercury</a></li></ul></div>",
                "links":[{"ns":0,"exists":true,"title":"Freddie Mercury"},
                         {"ns":0,"exists":true,"title":"Mercury (element)"},
                         {"ns":0,"exists":true,"title":"Mercury (planet)"},
                         {"ns":12,"exists":true,"title":"Help:Disambiguation"}]}}"#,
        );

        assert_eq!(
            options_in_page_order(page),
            vec!["Mercury (planet)", "Mercury (element)", "Freddie Mercury"]
        );
    }

    #[test]
    fn list_items_skip_red_links_and_other_namespaces() {
        let page = parsed(
            r#"{"parse":{"title":"ATT",
                "text":"<ul><li><a href=\"/w/index.php?title=ATT_(band)&amp;action=edit&amp;redlink=1\" class=\"new\" title=\"ATT (band) (page does not exist)\">ATT (band)</a></li><li><a href=\"/wiki/Wiktionary:ATT\" title=\"Wiktionary:ATT\">wikt</a> or <a href=\"/wiki/AT%26T\" title=\"AT&amp;T\">AT&amp;T</a></li></ul>",
                "links":[{"ns":0,"exists":true,"title":"AT&T"},
                         {"ns":0,"exists":false,"title":"ATT (band)"}]}}"#,
        );

        assert_eq!(options_in_page_order(page), vec!["AT&T"]);
    }

    #[test]
    fn pages_without_lists_fall_back_to_link_table() {
        let page = parsed(
            r#"{"parse":{"title":"X","text":"<p>See <a href=\"/wiki/Y\" title=\"Y\">Y</a>.</p>",
                "links":[{"ns":0,"exists":true,"title":"Y"}]}}"#,
        );
        assert_eq!(options_in_page_order(page), vec!["Y"]);

        assert!(options_in_page_order(ParsedPage::default()).is_empty());
    }

    #[test]
    fn page_url_uses_fullurl_and_skips_missing() {
        let resp = pages(
            r#"{"query":{"pages":[{"title":"Rust","fullurl":"https://en.wikipedia.org/wiki/Rust",
                "canonicalurl":"https://en.wikipedia.org/wiki/Rust"}]}}"#,
        );
        assert_eq!(
            page_url(resp, "en").as_deref(),
            Some("https://en.wikipedia.org/wiki/Rust")
        );

        let resp = pages(r#"{"query":{"pages":[{"title":"Alan Turing"}]}}"#);
        assert_eq!(
            page_url(resp, "de").as_deref(),
            Some("https://de.wikipedia.org/wiki/Alan_Turing")
        );

        let resp = pages(r#"{"query":{"pages":[{"title":"Nope","missing":true}]}}"#);
        assert_eq!(page_url(resp, "en"), None);
    }

    #[tokio::test]
    async fn invalid_language_fails_before_any_request() {
        let client = WikipediaClient::new("test", Duration::from_secs(1)).unwrap();
        let err = client.search("../", "x").await.unwrap_err();
        assert!(matches!(err, Error::External(_)));
    }
}
