//! HTML parsing and link extraction
//!
//! Link extraction works against the `HtmlDocument` capability so that the
//! HTML engine stays swappable; `ParsedHtml` implements it with `scraper`.
//! A parsed document is not `Send`, so parse and extract without holding it
//! across an `.await`.

use crate::url::normalize;
use scraper::{Html, Selector};
use url::Url;

/// Read access to a parsed HTML page
pub trait HtmlDocument {
    /// Raw `href` values of every `<a href>` in document order
    fn anchor_hrefs(&self) -> Vec<String>;

    /// Trimmed text of the first `<title>`, if non-empty
    fn title(&self) -> Option<String>;
}

/// An HTML document parsed with `scraper`
pub struct ParsedHtml {
    document: Html,
}

impl ParsedHtml {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    /// Parses raw bytes, replacing invalid UTF-8
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }
}

impl HtmlDocument for ParsedHtml {
    fn anchor_hrefs(&self) -> Vec<String> {
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        self.document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::to_string)
            .collect()
    }

    fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;

        self.document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// A hyperlink discovered on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdge {
    pub src: Url,
    pub dst: Url,
}

/// Resolves every anchor of `doc` against `src` into a normalized edge
///
/// Order follows the document and duplicates are kept. Hrefs that fail to
/// resolve or normalize (including non-http schemes) are skipped.
pub fn extract_links<'a, D>(doc: &D, src: &'a Url) -> impl Iterator<Item = LinkEdge> + 'a
where
    D: HtmlDocument + ?Sized,
{
    doc.anchor_hrefs()
        .into_iter()
        .filter_map(move |href| match normalize(&href, Some(src)) {
            Ok(dst) => Some(LinkEdge {
                src: src.clone(),
                dst,
            }),
            Err(e) => {
                tracing::debug!("Skipping link {:?} on {}: {}", href, src, e);
                None
            }
        })
}
