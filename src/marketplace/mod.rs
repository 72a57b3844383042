//! StratusLab Marketplace image catalog.
//!
//! The Marketplace publishes its catalog at `<endpoint>/metadata` as an XML
//! document whose children are `rdf:RDF` entries, each carrying an
//! `rdf:Description` with Dublin Core `identifier`, `title`, and
//! `description` elements.

use roxmltree::{Document, Node as XmlNode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::backend::{BackendConfig, MARKETPLACE_ENDPOINT};

/// Marketplace consulted when a location does not configure one.
pub const DEFAULT_MARKETPLACE_URL: &str = "https://marketplace.stratuslab.eu";

/// Maximum length, in characters, of an image name.
pub const IMAGE_NAME_LENGTH: usize = 30;

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const DC_TERMS_NS: &str = "http://purl.org/dc/terms/";

/// A Marketplace image.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Marketplace identifier.
    pub id: String,
    /// Short display name.
    pub name: String,
}

impl Image {
    /// Creates an image reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Errors raised while fetching or reading the catalog.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MarketplaceError {
    /// The catalog could not be downloaded.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or HTTP error message.
        message: String,
    },
    /// The catalog is not well-formed XML.
    #[error("failed to parse marketplace catalog: {0}")]
    Parse(String),
    /// A catalog entry lacks a description or identifier.
    #[error("malformed marketplace entry: {0}")]
    MalformedEntry(String),
}

/// Retrieves catalog documents.
pub trait CatalogFetcher {
    /// Downloads the document at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Fetch`] when the download fails.
    fn fetch(&self, url: &str) -> Result<String, MarketplaceError>;
}

/// Blocking HTTP fetcher.
#[derive(Clone, Debug, Default)]
pub struct HttpCatalogFetcher {
    client: reqwest::blocking::Client,
}

impl HttpCatalogFetcher {
    /// Creates a fetcher around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl CatalogFetcher for HttpCatalogFetcher {
    fn fetch(&self, url: &str) -> Result<String, MarketplaceError> {
        let fetch_error = |err: reqwest::Error| MarketplaceError::Fetch {
            url: url.to_owned(),
            message: err.to_string(),
        };
        self.client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(fetch_error)
    }
}

/// Lists Marketplace images through a [`CatalogFetcher`].
#[derive(Clone, Debug, Default)]
pub struct Marketplace<F> {
    fetcher: F,
}

impl<F: CatalogFetcher> Marketplace<F> {
    /// Creates a catalog client.
    #[must_use]
    pub const fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Returns the fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetches and parses the catalog of the Marketplace configured for a
    /// location.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] when the download or parse fails.
    pub fn images(&self, config: &BackendConfig) -> Result<Vec<Image>, MarketplaceError> {
        let url = metadata_url(endpoint(config));
        debug!(%url, "fetching marketplace catalog");
        let document = self.fetcher.fetch(&url)?;
        parse_catalog(&document)
    }
}

/// Returns the Marketplace endpoint configured for a location, or
/// [`DEFAULT_MARKETPLACE_URL`].
#[must_use]
pub fn endpoint(config: &BackendConfig) -> &str {
    config
        .get(MARKETPLACE_ENDPOINT)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_MARKETPLACE_URL)
}

/// Returns the catalog URL of a Marketplace endpoint.
#[must_use]
pub fn metadata_url(endpoint: &str) -> String {
    format!("{}/metadata", endpoint.trim_end_matches('/'))
}

/// Parses a catalog document into images, in document order.
///
/// # Errors
///
/// Returns [`MarketplaceError::Parse`] for malformed XML and
/// [`MarketplaceError::MalformedEntry`] for entries without a description or
/// identifier.
pub fn parse_catalog(document: &str) -> Result<Vec<Image>, MarketplaceError> {
    let doc = Document::parse(document).map_err(|err| MarketplaceError::Parse(err.to_string()))?;

    doc.root_element()
        .children()
        .filter(|node| node.has_tag_name((RDF_NS, "RDF")))
        .map(|entry| {
            let description = child(entry, RDF_NS, "Description").ok_or_else(|| {
                MarketplaceError::MalformedEntry(String::from("entry has no rdf:Description"))
            })?;
            image_from_description(description)
        })
        .collect()
}

fn image_from_description(description: XmlNode<'_, '_>) -> Result<Image, MarketplaceError> {
    let id = child_text(description, "identifier").ok_or_else(|| {
        MarketplaceError::MalformedEntry(String::from("entry has no dcterms:identifier"))
    })?;

    let label = child_text(description, "title").or_else(|| child_text(description, "description"));
    let name = label.map(display_name).unwrap_or_default();

    Ok(Image::new(id.trim(), name))
}

fn child<'a, 'input>(
    parent: XmlNode<'a, 'input>,
    namespace: &str,
    name: &str,
) -> Option<XmlNode<'a, 'input>> {
    parent
        .children()
        .find(|node| node.has_tag_name((namespace, name)))
}

fn child_text<'a>(parent: XmlNode<'a, '_>, name: &str) -> Option<&'a str> {
    child(parent, DC_TERMS_NS, name)
        .and_then(|node| node.text())
        .filter(|text| !text.trim().is_empty())
}

fn display_name(text: &str) -> String {
    text.trim_start().chars().take(IMAGE_NAME_LENGTH).collect()
}
