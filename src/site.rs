use std::collections::HashMap;

use url::Url;

use crate::{Error, Result};

/// Documents that test contexts may visit, keyed by absolute URL.
#[derive(Debug, Clone, Default)]
pub struct Site {
    documents: HashMap<String, String>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Result<Self> {
        self.add_page(url, html)?;
        Ok(self)
    }

    /// Registers or replaces the document served at `url`.
    pub fn add_page(&mut self, url: &str, html: &str) -> Result<()> {
        let key = document_key(&parse_absolute(url)?);
        tracing::debug!(url = %key, bytes = html.len(), "registered page");
        self.documents.insert(key, html.to_string());
        Ok(())
    }

    pub fn contains(&self, url: &str) -> bool {
        parse_absolute(url)
            .map(|parsed| self.documents.contains_key(&document_key(&parsed)))
            .unwrap_or(false)
    }

    pub(crate) fn lookup(&self, url: &Url) -> Option<&str> {
        self.documents.get(&document_key(url)).map(String::as_str)
    }
}

pub(crate) fn parse_absolute(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| Error::Navigation(format!("invalid url {url}: {err}")))
}

pub(crate) fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn document_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_fragments() -> Result<()> {
        let site = Site::new().with_page("https://example.test/actions", "<p>x</p>")?;
        assert!(site.contains("https://example.test/actions#checkboxes"));
        assert!(!site.contains("https://example.test/other"));
        assert!(!site.contains("not a url"));
        let url = parse_absolute("https://example.test/actions#top")?;
        assert_eq!(site.lookup(&url), Some("<p>x</p>"));
        Ok(())
    }

    #[test]
    fn origins_include_scheme_host_and_port() -> Result<()> {
        let a = parse_absolute("https://example.test/a")?;
        let b = parse_absolute("https://example.test:8443/b")?;
        assert_eq!(origin_of(&a), "https://example.test");
        assert_ne!(origin_of(&a), origin_of(&b));
        Ok(())
    }

    #[test]
    fn relative_urls_cannot_be_registered() {
        let err = Site::new().with_page("/actions", "<p></p>");
        assert!(matches!(err, Err(Error::Navigation(_))));
    }
}
