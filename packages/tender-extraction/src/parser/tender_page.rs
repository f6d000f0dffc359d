//! Selector-based parser for portal tender detail pages.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::error::{ParseError, ParseResult};
use crate::traits::parser::ContentParser;
use crate::types::tender::{DocumentDescriptor, ParsedFields};

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

/// Candidates in priority order; the first with text wins.
fn candidates(group: &[&str]) -> Vec<Selector> {
    group.iter().map(|css| selector(css)).collect()
}

static TITLE: LazyLock<Vec<Selector>> =
    LazyLock::new(|| candidates(&["#lblNombreLicitacion", ".nombre-licitacion", "h1"]));
static ENTITY: LazyLock<Vec<Selector>> =
    LazyLock::new(|| candidates(&["#lblOrganismo", ".organismo-comprador"]));
static OFFERS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| candidates(&["#lblNumeroOfertas", ".numero-ofertas"]));
static DOCUMENTS: LazyLock<Selector> =
    LazyLock::new(|| selector("a[href*='Attachment'], a[href*='documento']"));

/// Parser for `DetailsAcquisition.aspx` pages.
///
/// Missing elements leave the corresponding field empty; only markup with
/// no content at all is rejected as malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenderPageParser;

impl TenderPageParser {
    pub fn new() -> Self {
        Self
    }

    fn first_text(document: &Html, candidates: &[Selector]) -> Option<String> {
        candidates.iter().find_map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }

    fn offers(document: &Html) -> Option<u32> {
        let raw = Self::first_text(document, &OFFERS)?;
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    fn documents(document: &Html, page_url: &Url) -> Vec<DocumentDescriptor> {
        let mut documents: Vec<DocumentDescriptor> = Vec::new();

        for link in document.select(&DOCUMENTS) {
            let Some(href) = link.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href.starts_with("javascript:") {
                continue;
            }
            let Ok(resolved) = page_url.join(href) else {
                continue;
            };
            let url = resolved.to_string();
            if documents.iter().any(|d| d.url == url) {
                continue;
            }

            let mut filename = element_text(link);
            if filename.is_empty() {
                filename = resolved
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string();
            }

            documents.push(DocumentDescriptor::new(filename, url));
        }

        documents
    }
}

/// Collapsed, trimmed text content of an element.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl ContentParser for TenderPageParser {
    fn parse(&self, html: &str, page_url: &Url) -> ParseResult<ParsedFields> {
        if html.trim().is_empty() {
            return Err(ParseError::MalformedContent {
                reason: "empty document".to_string(),
            });
        }

        let document = Html::parse_document(html);

        Ok(ParsedFields {
            title: Self::first_text(&document, &TITLE),
            entity: Self::first_text(&document, &ENTITY),
            offers: Self::offers(&document),
            documents: Self::documents(&document, page_url),
        })
    }
}
