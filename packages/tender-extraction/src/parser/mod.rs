//! Content parsers.

mod tender_page;

pub use tender_page::TenderPageParser;

pub use crate::traits::parser::ContentParser;
