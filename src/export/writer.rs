//! WXR document writer
//!
//! Forward-only emitter over a quick-xml writer with tab indentation. The
//! document is produced in a fixed order:
//!
//! header and channel metadata -> authors -> terms -> items -> footer
//!
//! Terms and items may be written in several calls; every other stage is
//! written once. Writing a stage out of order is a serialization error.
//! Output accumulates in an internal buffer that the caller drains with
//! [`WxrWriter::take_chunk`].

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::cdata::{cdata_sections, find_invalid_char};
use super::error::ExportError;
use super::hierarchy::ResolvedTerms;
use crate::config::SiteConfig;
use crate::models::{Author, Comment, Entity, MetaEntry, Term, NAV_MENU_TAXONOMY};

/// Version of the export format
pub const WXR_VERSION: &str = "1.2";

/// Date rendered for dates that were never set
pub const ZERO_DATE: &str = "0000-00-00 00:00:00";

const DB_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

const HEADER_COMMENTS: &[&str] = &[
    " This is a WordPress eXtended RSS file generated by WordPress as an export of your site. ",
    " It contains information about your site's posts, pages, comments, categories, and other content. ",
    " You may use this file to transfer that content from one site to another. ",
    " This file is not intended to serve as a complete backup of your site. ",
    " To import this information into a WordPress site follow these steps: ",
    " 1. Log in to that site as an administrator. ",
    " 2. Go to Tools: Import in the WordPress admin panel. ",
    " 3. Install the \"WordPress\" importer from the list. ",
    " 4. Activate & Run Importer. ",
    " 5. Upload this file using the form provided on that page. ",
    " 6. You will first be asked to map the authors in this export file to users ",
    "    on the site. For each author, you may choose to map to an ",
    "    existing user on the site or to create a new user. ",
    " 7. WordPress will then import each of the posts, pages, comments, categories, etc. ",
    "    contained in this file into your site. ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Start,
    Channel,
    Authors,
    Terms,
    Items,
    Finished,
}

/// A comment with the metadata that survived the skip hooks
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub comment: Comment,
    pub meta: Vec<MetaEntry>,
}

/// Everything written for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub entity: Entity,
    /// Title after the title hook
    pub title: String,
    /// Body after the content hook
    pub content: String,
    /// Excerpt after the excerpt hook
    pub excerpt: String,
    pub link: String,
    pub is_sticky: bool,
    /// Set for attachments only
    pub attachment_url: Option<String>,
    pub terms: Vec<Term>,
    pub meta: Vec<MetaEntry>,
    pub comments: Vec<CommentRecord>,
}

/// Format a stored date, or the zero date when unset
pub fn format_db_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format(DB_DATE_FORMAT).to_string())
        .unwrap_or_else(|| ZERO_DATE.to_string())
}

/// Format a UTC date the way RSS `pubDate` expects
pub fn format_rss_date(date: NaiveDateTime) -> String {
    date.format(RSS_DATE_FORMAT).to_string()
}

/// Streaming WXR writer
pub struct WxrWriter {
    writer: Writer<Vec<u8>>,
    stage: Stage,
    bytes_written: u64,
}

impl Default for WxrWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WxrWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
            stage: Stage::Start,
            bytes_written: 0,
        }
    }

    /// Drain the bytes written since the last call
    pub fn take_chunk(&mut self) -> Vec<u8> {
        let chunk = std::mem::take(self.writer.get_mut());
        self.bytes_written += chunk.len() as u64;
        chunk
    }

    /// Total bytes drained so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the footer has been written
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    fn advance(&mut self, next: Stage) -> Result<(), ExportError> {
        let repeatable = matches!(next, Stage::Terms | Stage::Items);
        let out_of_order = next < self.stage
            || (next == self.stage && !repeatable)
            || (self.stage == Stage::Start && next != Stage::Channel);
        if out_of_order {
            return Err(ExportError::serialization(format!(
                "cannot write {:?} at stage {:?}",
                next, self.stage
            )));
        }
        self.stage = next;
        Ok(())
    }

    /// XML declaration, header comments, `<rss>` and channel metadata
    pub fn write_header(
        &mut self,
        site: &SiteConfig,
        now: DateTime<Utc>,
    ) -> Result<(), ExportError> {
        self.advance(Stage::Channel)?;

        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        for line in HEADER_COMMENTS {
            self.event(Event::Comment(BytesText::from_escaped(*line)))?;
        }
        let generator = format!(
            " generator=\"wxr-export/{}\" created=\"{}\" ",
            env!("CARGO_PKG_VERSION"),
            now.format("%Y-%m-%d %H:%M")
        );
        self.event(Event::Comment(BytesText::from_escaped(generator)))?;

        let excerpt_ns = format!("http://wordpress.org/export/{}/excerpt/", WXR_VERSION);
        let wp_ns = format!("http://wordpress.org/export/{}/", WXR_VERSION);
        let rss = BytesStart::new("rss").with_attributes([
            ("version", "2.0"),
            ("xmlns:excerpt", excerpt_ns.as_str()),
            ("xmlns:content", "http://purl.org/rss/1.0/modules/content/"),
            ("xmlns:wfw", "http://wellformedweb.org/CommentAPI/"),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:wp", wp_ns.as_str()),
        ]);
        self.event(Event::Start(rss))?;
        self.start("channel")?;

        self.text_element("title", &site.title)?;
        self.text_element("link", site.blog_url())?;
        self.text_element("description", &site.description)?;
        self.text_element("pubDate", &format_rss_date(now.naive_utc()))?;
        self.text_element("language", &site.language)?;
        self.text_element("wp:wxr_version", WXR_VERSION)?;
        self.text_element("wp:base_site_url", site.base_site_url())?;
        self.text_element("wp:base_blog_url", site.blog_url())
    }

    /// `<wp:author>` blocks
    pub fn write_authors(&mut self, authors: &[Author]) -> Result<(), ExportError> {
        self.advance(Stage::Authors)?;

        for author in authors {
            self.start("wp:author")?;
            self.text_element("wp:author_id", &author.id.to_string())?;
            self.text_element("wp:author_login", &author.login)?;
            self.text_element("wp:author_email", &author.email)?;
            self.cdata_element("wp:author_display_name", &author.display_name)?;
            self.cdata_element("wp:author_first_name", &author.first_name)?;
            self.cdata_element("wp:author_last_name", &author.last_name)?;
            self.end("wp:author")?;
        }
        Ok(())
    }

    /// `<wp:category>` blocks, parents first
    pub fn write_categories(&mut self, categories: &ResolvedTerms) -> Result<(), ExportError> {
        self.advance(Stage::Terms)?;

        for category in categories.terms() {
            self.start("wp:category")?;
            self.text_element("wp:term_id", &category.id.to_string())?;
            self.text_element("wp:category_nicename", &category.slug)?;
            self.text_element("wp:category_parent", categories.parent_slug(category))?;
            self.optional_cdata_element("wp:cat_name", &category.name)?;
            self.optional_cdata_element("wp:category_description", &category.description)?;
            self.end("wp:category")?;
        }
        Ok(())
    }

    /// `<wp:tag>` blocks
    pub fn write_tags(&mut self, tags: &[Term]) -> Result<(), ExportError> {
        self.advance(Stage::Terms)?;

        for tag in tags {
            self.start("wp:tag")?;
            self.text_element("wp:term_id", &tag.id.to_string())?;
            self.text_element("wp:tag_slug", &tag.slug)?;
            self.optional_cdata_element("wp:tag_name", &tag.name)?;
            self.optional_cdata_element("wp:tag_description", &tag.description)?;
            self.end("wp:tag")?;
        }
        Ok(())
    }

    /// `<wp:term>` blocks for custom taxonomies, parents first
    pub fn write_terms(&mut self, terms: &ResolvedTerms) -> Result<(), ExportError> {
        self.advance(Stage::Terms)?;

        for term in terms.terms() {
            self.start("wp:term")?;
            self.text_element("wp:term_id", &term.id.to_string())?;
            self.text_element("wp:term_taxonomy", &term.taxonomy)?;
            self.text_element("wp:term_slug", &term.slug)?;
            self.text_element("wp:term_parent", terms.parent_slug(term))?;
            self.optional_cdata_element("wp:term_name", &term.name)?;
            self.optional_cdata_element("wp:term_description", &term.description)?;
            self.end("wp:term")?;
        }
        Ok(())
    }

    /// `<wp:term>` blocks for navigation menus
    pub fn write_nav_menu_terms(&mut self, menus: &[Term]) -> Result<(), ExportError> {
        self.advance(Stage::Terms)?;

        for menu in menus {
            self.start("wp:term")?;
            self.text_element("wp:term_id", &menu.id.to_string())?;
            self.text_element("wp:term_taxonomy", NAV_MENU_TAXONOMY)?;
            self.text_element("wp:term_slug", &menu.slug)?;
            self.optional_cdata_element("wp:term_name", &menu.name)?;
            self.end("wp:term")?;
        }
        Ok(())
    }

    /// One `<item>` block
    pub fn write_item(&mut self, item: &ItemRecord) -> Result<(), ExportError> {
        self.advance(Stage::Items)?;
        let entity = &item.entity;

        self.start("item")?;
        self.text_element("title", &item.title)?;
        self.text_element("link", &item.link)?;
        let published = entity.post_date_gmt.unwrap_or(entity.post_date);
        self.text_element("pubDate", &format_rss_date(published))?;
        self.cdata_element("dc:creator", &entity.author_login)?;
        self.check_text("guid", &entity.guid)?;
        self.event(Event::Start(
            BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
        ))?;
        self.event(Event::Text(BytesText::new(&entity.guid)))?;
        self.end("guid")?;
        self.text_element("description", "")?;
        self.cdata_element("content:encoded", &item.content)?;
        self.cdata_element("excerpt:encoded", &item.excerpt)?;
        self.text_element("wp:post_id", &entity.id.to_string())?;
        self.text_element("wp:post_date", &format_db_date(Some(entity.post_date)))?;
        self.text_element("wp:post_date_gmt", &format_db_date(entity.post_date_gmt))?;
        self.text_element("wp:comment_status", &entity.comment_status)?;
        self.text_element("wp:ping_status", &entity.ping_status)?;
        self.text_element("wp:post_name", &entity.name)?;
        self.text_element("wp:status", &entity.status)?;
        self.text_element("wp:post_parent", &entity.parent_id.to_string())?;
        self.text_element("wp:menu_order", &entity.menu_order.to_string())?;
        self.text_element("wp:post_type", &entity.post_type)?;
        self.text_element("wp:post_password", &entity.password)?;
        self.text_element("wp:is_sticky", if item.is_sticky { "1" } else { "0" })?;
        if let Some(url) = &item.attachment_url {
            self.text_element("wp:attachment_url", url)?;
        }

        for term in &item.terms {
            self.check_text("category", &term.name)?;
            let category = BytesStart::new("category").with_attributes([
                ("domain", term.taxonomy.as_str()),
                ("nicename", term.slug.as_str()),
            ]);
            self.event(Event::Start(category))?;
            self.cdata("category", &term.name)?;
            self.end("category")?;
        }

        for meta in &item.meta {
            self.write_meta("wp:postmeta", meta)?;
        }

        for record in &item.comments {
            self.write_comment(record)?;
        }

        self.end("item")
    }

    /// Close the channel and the document
    pub fn finish(&mut self) -> Result<(), ExportError> {
        self.advance(Stage::Finished)?;
        self.end("channel")?;
        self.end("rss")
    }

    fn write_comment(&mut self, record: &CommentRecord) -> Result<(), ExportError> {
        let c = &record.comment;

        self.start("wp:comment")?;
        self.text_element("wp:comment_id", &c.id.to_string())?;
        self.cdata_element("wp:comment_author", &c.author)?;
        self.text_element("wp:comment_author_email", &c.author_email)?;
        self.text_element("wp:comment_author_url", &c.author_url)?;
        self.text_element("wp:comment_author_IP", &c.author_ip)?;
        self.text_element("wp:comment_date", &format_db_date(Some(c.date)))?;
        self.text_element("wp:comment_date_gmt", &format_db_date(c.date_gmt))?;
        self.cdata_element("wp:comment_content", &c.content)?;
        self.text_element("wp:comment_approved", &c.approved)?;
        self.text_element("wp:comment_type", &c.comment_type)?;
        self.text_element("wp:comment_parent", &c.parent_id.to_string())?;
        self.text_element("wp:comment_user_id", &c.user_id.to_string())?;
        for meta in &record.meta {
            self.write_meta("wp:commentmeta", meta)?;
        }
        self.end("wp:comment")
    }

    fn write_meta(&mut self, name: &str, meta: &MetaEntry) -> Result<(), ExportError> {
        self.start(name)?;
        self.text_element("wp:meta_key", &meta.key)?;
        self.cdata_element("wp:meta_value", &meta.value)?;
        self.end(name)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ExportError> {
        self.writer
            .write_event(event)
            .map_err(|e| ExportError::serialization(format!("failed to write XML: {}", e)))
    }

    fn start(&mut self, name: &str) -> Result<(), ExportError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), ExportError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn check_text(&self, element: &str, text: &str) -> Result<(), ExportError> {
        match find_invalid_char(text) {
            Some(c) => Err(ExportError::serialization(format!(
                "character U+{:04X} is not allowed in <{}>",
                c as u32, element
            ))),
            None => Ok(()),
        }
    }

    /// Escaped text element; empty text still keeps the element on one line
    fn text_element(&mut self, name: &str, text: &str) -> Result<(), ExportError> {
        self.check_text(name, text)?;
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn cdata(&mut self, element: &str, text: &str) -> Result<(), ExportError> {
        self.check_text(element, text)?;
        for section in cdata_sections(text) {
            self.event(Event::CData(BytesCData::new(section)))?;
        }
        Ok(())
    }

    fn cdata_element(&mut self, name: &str, text: &str) -> Result<(), ExportError> {
        self.start(name)?;
        self.cdata(name, text)?;
        self.end(name)
    }

    fn optional_cdata_element(&mut self, name: &str, text: &str) -> Result<(), ExportError> {
        if text.is_empty() {
            return Ok(());
        }
        self.cdata_element(name, text)
    }
}
