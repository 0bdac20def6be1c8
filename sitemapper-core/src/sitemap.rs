//! Sitemap XML documents shared by the generator and the validator.
//!
//! Two document shapes are supported, both in the `sitemaps.org` 0.9 namespace:
//!
//! - **Sitemap index**: `<sitemapindex>` with `<sitemap>` entries pointing at child sitemaps
//! - **URL set**: `<urlset>` with `<url>` entries, optionally carrying Google News metadata
//!
//! Serialization always emits an XML declaration followed by a two-space indented body.
//! Parsing matches on local element names so prefixed or namespaced documents are accepted.

use crate::error::{Result, SitemapError};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const NEWS_NAMESPACE: &str = "http://www.google.com/schemas/sitemap-news/0.9";

/// A `<sitemap>` entry of an index document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitemapRef {
    pub location: String,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitemapIndexDoc {
    pub sitemaps: Vec<SitemapRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsMetadata {
    pub publication_name: String,
    pub language: String,
    pub publication_date: String,
    pub title: String,
}

/// A `<url>` entry of a URL set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub location: String,
    pub last_modified: Option<String>,
    pub change_frequency: Option<String>,
    pub priority: Option<f64>,
    pub news: Option<NewsMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlSetDoc {
    /// Declare the `news` namespace on the root element.
    pub news_namespace: bool,
    pub urls: Vec<UrlEntry>,
}

/// A parsed document of either shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    Index(SitemapIndexDoc),
    UrlSet(UrlSetDoc),
}

fn xml_err<E: Display>(e: E) -> SitemapError {
    SitemapError::Xml(e.to_string())
}

type XmlWriter = Writer<Vec<u8>>;

fn new_writer() -> Result<XmlWriter> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    Ok(writer)
}

fn finish(writer: XmlWriter) -> Vec<u8> {
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    bytes
}

fn start(writer: &mut XmlWriter, element: BytesStart<'_>) -> Result<()> {
    writer.write_event(Event::Start(element)).map_err(xml_err)
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, BytesStart::new(name))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    end(writer, name)
}

impl SitemapIndexDoc {
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = new_writer()?;

        let mut root = BytesStart::new("sitemapindex");
        root.push_attribute(("xmlns", SITEMAP_NAMESPACE));
        start(&mut writer, root)?;

        for sitemap in &self.sitemaps {
            start(&mut writer, BytesStart::new("sitemap"))?;
            text_element(&mut writer, "loc", &sitemap.location)?;
            if let Some(ref lastmod) = sitemap.last_modified {
                text_element(&mut writer, "lastmod", lastmod)?;
            }
            end(&mut writer, "sitemap")?;
        }

        end(&mut writer, "sitemapindex")?;
        Ok(finish(writer))
    }
}

impl UrlSetDoc {
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = new_writer()?;

        let mut root = BytesStart::new("urlset");
        root.push_attribute(("xmlns", SITEMAP_NAMESPACE));
        if self.news_namespace {
            root.push_attribute(("xmlns:news", NEWS_NAMESPACE));
        }
        start(&mut writer, root)?;

        for url in &self.urls {
            start(&mut writer, BytesStart::new("url"))?;
            text_element(&mut writer, "loc", &url.location)?;
            if let Some(ref lastmod) = url.last_modified {
                text_element(&mut writer, "lastmod", lastmod)?;
            }
            if let Some(ref changefreq) = url.change_frequency {
                text_element(&mut writer, "changefreq", changefreq)?;
            }
            if let Some(priority) = url.priority {
                text_element(&mut writer, "priority", &priority.to_string())?;
            }
            if let Some(ref news) = url.news {
                start(&mut writer, BytesStart::new("news:news"))?;
                start(&mut writer, BytesStart::new("news:publication"))?;
                text_element(&mut writer, "news:name", &news.publication_name)?;
                text_element(&mut writer, "news:language", &news.language)?;
                end(&mut writer, "news:publication")?;
                text_element(&mut writer, "news:publication_date", &news.publication_date)?;
                text_element(&mut writer, "news:title", &news.title)?;
                end(&mut writer, "news:news")?;
            }
            end(&mut writer, "url")?;
        }

        end(&mut writer, "urlset")?;
        Ok(finish(writer))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RootKind {
    Index,
    UrlSet,
}

/// Accumulates entries while walking reader events.
#[derive(Default)]
struct DocumentBuilder {
    root: Option<RootKind>,
    path: Vec<String>,
    index: SitemapIndexDoc,
    urlset: UrlSetDoc,
    current_ref: Option<SitemapRef>,
    current_url: Option<UrlEntry>,
    current_news: Option<NewsMetadata>,
}

impl DocumentBuilder {
    fn set_root(&mut self, name: &str) -> Result<()> {
        self.root = Some(match name {
            "sitemapindex" => RootKind::Index,
            "urlset" => RootKind::UrlSet,
            other => {
                return Err(SitemapError::Xml(format!(
                    "Unexpected root element <{}>: not a sitemap index or URL set",
                    other
                )));
            }
        });
        Ok(())
    }

    fn start(&mut self, name: String) -> Result<()> {
        if self.root.is_none() {
            self.set_root(&name)?;
        } else if self.path.len() == 1 {
            match (self.root, name.as_str()) {
                (Some(RootKind::Index), "sitemap") => self.current_ref = Some(SitemapRef::default()),
                (Some(RootKind::UrlSet), "url") => self.current_url = Some(UrlEntry::default()),
                _ => {}
            }
        } else if self.path.len() == 2 && name == "news" && self.current_url.is_some() {
            self.current_news = Some(NewsMetadata::default());
        }
        self.path.push(name);
        Ok(())
    }

    fn end(&mut self) {
        let Some(name) = self.path.pop() else {
            return;
        };
        // Entries close at depth 1 and news blocks at depth 2; namesakes deeper down are extension markup
        match (self.path.len(), name.as_str()) {
            (1, "sitemap") => {
                if let Some(sitemap) = self.current_ref.take()
                    && !sitemap.location.is_empty()
                {
                    self.index.sitemaps.push(sitemap);
                }
            }
            (1, "url") => {
                if let Some(url) = self.current_url.take()
                    && !url.location.is_empty()
                {
                    self.urlset.urls.push(url);
                }
            }
            (2, "news") => {
                if let (Some(news), Some(url)) = (self.current_news.take(), self.current_url.as_mut())
                {
                    url.news = Some(news);
                }
            }
            _ => {}
        }
    }

    /// Only direct children of `<url>`/`<sitemap>` and of `<news:news>` are read,
    /// so image and video extension fields never overwrite entry fields.
    fn text(&mut self, text: &str) {
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();

        if let Some(news) = self.current_news.as_mut() {
            match path.as_slice() {
                [_, "url", "news", "publication", "name"] => news.publication_name = text.to_string(),
                [_, "url", "news", "publication", "language"] => news.language = text.to_string(),
                [_, "url", "news", "publication_date"] => news.publication_date = text.to_string(),
                [_, "url", "news", "title"] => news.title = text.to_string(),
                _ => {}
            }
        } else if let Some(url) = self.current_url.as_mut() {
            match path.as_slice() {
                [_, "url", "loc"] => url.location = text.to_string(),
                [_, "url", "lastmod"] => url.last_modified = Some(text.to_string()),
                [_, "url", "changefreq"] => url.change_frequency = Some(text.to_string()),
                [_, "url", "priority"] => url.priority = text.parse().ok(),
                _ => {}
            }
        } else if let Some(sitemap) = self.current_ref.as_mut() {
            match path.as_slice() {
                [_, "sitemap", "loc"] => sitemap.location = text.to_string(),
                [_, "sitemap", "lastmod"] => sitemap.last_modified = Some(text.to_string()),
                _ => {}
            }
        }
    }

    fn build(self) -> Result<SitemapDocument> {
        match self.root {
            Some(RootKind::Index) => Ok(SitemapDocument::Index(self.index)),
            Some(RootKind::UrlSet) => Ok(SitemapDocument::UrlSet(self.urlset)),
            None => Err(SitemapError::Xml("Document has no root element".to_string())),
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).to_string()
}

/// Parse either sitemap shape, detected from the root element.
pub fn parse_document(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = DocumentBuilder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => builder.start(local_name(&e))?,
            Ok(Event::Empty(e)) => {
                // <urlset/> is an empty but valid document; other empty elements carry nothing
                if builder.root.is_none() {
                    builder.set_root(&local_name(&e))?;
                }
            }
            Ok(Event::End(_)) => builder.end(),
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_err)?;
                builder.text(text.trim());
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                builder.text(text.trim());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SitemapError::Xml(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    builder.build()
}
