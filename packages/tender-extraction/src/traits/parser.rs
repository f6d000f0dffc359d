//! Content parser trait.

use std::sync::Arc;
use url::Url;

use crate::error::ParseResult;
use crate::types::tender::ParsedFields;

/// Pure HTML → fields transformation.
///
/// Must be deterministic and perform no I/O: the engine calls it inline
/// between suspension points. `page_url` is only used to resolve relative
/// links.
pub trait ContentParser: Send + Sync {
    fn parse(&self, html: &str, page_url: &Url) -> ParseResult<ParsedFields>;
}

impl<P: ContentParser + ?Sized> ContentParser for Arc<P> {
    fn parse(&self, html: &str, page_url: &Url) -> ParseResult<ParsedFields> {
        (**self).parse(html, page_url)
    }
}
