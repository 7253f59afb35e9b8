//! Read-only queries over rendered page content.
//!
//! The browser adapter hands back the rendered HTML of a page; everything the
//! extractor needs to know about elements (text, attributes, nesting) is read
//! from that snapshot with `scraper`.

use scraper::{ElementRef, Html, Selector};

use crate::utils::error::{AppError, Result};

pub struct Document {
    html: Html,
}

/// An element inside a [`Document`]. Only valid while the document lives.
#[derive(Debug, Clone, Copy)]
pub struct ElementHandle<'a> {
    element: ElementRef<'a>,
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

impl Document {
    pub fn parse(content: &str) -> Self {
        Self {
            html: Html::parse_document(content),
        }
    }

    /// All elements matching `selector`, in document order.
    pub fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .html
            .select(&selector)
            .map(|element| ElementHandle { element })
            .collect())
    }

    pub fn read_text(&self, element: ElementHandle<'_>) -> String {
        element.text()
    }

    pub fn read_attribute(&self, element: ElementHandle<'_>, name: &str) -> Option<String> {
        element.attribute(name).map(str::to_string)
    }
}

impl<'a> ElementHandle<'a> {
    /// Descendants of this element matching `selector`.
    pub fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle<'a>>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .element
            .select(&selector)
            .map(|element| ElementHandle { element })
            .collect())
    }

    pub fn query_first(&self, selector: &str) -> Result<Option<ElementHandle<'a>>> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    /// Concatenated text of the element and its descendants, untrimmed.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }
}
