//! Export orchestrator
//!
//! Runs one export from filter to finished document: hooks, planning, term
//! collection, then the header, authors, terms and batched items, flushing
//! to the sink after every stage and every batch.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use super::error::ExportError;
use super::filter::{ExportFilter, POST_TYPE};
use super::hierarchy::{resolve_hierarchy, ResolvedTerms};
use super::hooks::ExportHooks;
use super::planner::{dedup_preserving_order, QueryPlanner};
use super::sink::ExportSink;
use super::writer::{CommentRecord, ItemRecord, WxrWriter};
use crate::config::{ExportConfig, SiteConfig};
use crate::db::repositories::ContentRepository;
use crate::models::{Entity, MetaEntry, CATEGORY_TAXONOMY, NAV_MENU_TAXONOMY, TAG_TAXONOMY};

/// Metadata key holding an attachment's path below the uploads directory
pub const ATTACHED_FILE_META_KEY: &str = "_wp_attached_file";

/// Outcome of a finished export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Items written
    pub entities: usize,
    /// Entity batches fetched
    pub batches: usize,
    /// Document size in bytes
    pub bytes: u64,
}

/// Lowercase the input and keep only `a-z`, `0-9`, `_` and `-`
pub fn sanitize_key(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Export engine
#[derive(Clone)]
pub struct Exporter {
    repo: Arc<dyn ContentRepository>,
    hooks: Arc<ExportHooks>,
    site: SiteConfig,
    config: ExportConfig,
}

impl Exporter {
    pub fn new(
        repo: Arc<dyn ContentRepository>,
        hooks: Arc<ExportHooks>,
        site: SiteConfig,
        config: ExportConfig,
    ) -> Self {
        Self {
            repo,
            hooks,
            site,
            config,
        }
    }

    /// Content type and status registry used by this exporter
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Download filename for an export made on `today`
    pub fn filename(&self, today: NaiveDate) -> String {
        let date = today.format("%Y-%m-%d");
        match sanitize_key(&self.site.title) {
            slug if slug.is_empty() => format!("wordpress.{}.xml", date),
            slug => format!("{}.wordpress.{}.xml", slug, date),
        }
    }

    /// Write the export selected by `filter` into `sink`
    ///
    /// # Errors
    ///
    /// Repository and serialization failures abort the run; whatever was
    /// already flushed stays in the sink.
    pub async fn export<S>(
        &self,
        filter: ExportFilter,
        sink: &mut S,
    ) -> Result<ExportSummary, ExportError>
    where
        S: ExportSink + ?Sized,
    {
        let filter = self.hooks.export_args.apply(filter, &());
        self.hooks.export_started.fire(&filter);

        let plan = QueryPlanner::new(self.repo.as_ref(), &self.config)
            .plan(&filter)
            .await?;
        let ids = dedup_preserving_order(self.hooks.post_ids.apply(plan.post_ids, &filter));
        info!(
            "Exporting {} entities of types {:?}",
            ids.len(),
            plan.content_types
        );

        let custom_terms = resolve_hierarchy(
            self.repo
                .fetch_terms(&self.custom_taxonomies(&plan.content_types, filter.menus))
                .await?,
        );

        let (categories, tags) = if filter.includes(POST_TYPE) {
            let categories = match plan.category {
                Some(term) => ResolvedTerms::single(term),
                None => resolve_hierarchy(self.repo.fetch_categories().await?),
            };
            (categories, self.repo.fetch_tags().await?)
        } else {
            (ResolvedTerms::default(), Vec::new())
        };

        let authors = self.repo.distinct_authors(&ids).await?;
        let sticky: HashSet<i64> = self.repo.sticky_ids().await?.into_iter().collect();
        let nav_menus = if filter.menus {
            self.repo.fetch_nav_menus().await?
        } else {
            Vec::new()
        };

        let mut writer = WxrWriter::new();
        writer.write_header(&self.site, Utc::now())?;
        flush(&mut writer, sink).await?;

        writer.write_authors(&authors)?;
        flush(&mut writer, sink).await?;

        writer.write_categories(&categories)?;
        writer.write_tags(&tags)?;
        writer.write_terms(&custom_terms)?;
        writer.write_nav_menu_terms(&nav_menus)?;
        flush(&mut writer, sink).await?;

        let mut summary = ExportSummary::default();
        for batch in ids.chunks(self.config.batch_size.max(1)) {
            let entities = self.repo.fetch_entities(batch).await?;
            for entity in entities {
                let item = self.item_record(entity, &sticky).await?;
                writer.write_item(&item)?;
                summary.entities += 1;
            }
            summary.batches += 1;
            flush(&mut writer, sink).await?;
            debug!(
                "Wrote batch {} ({} entities so far)",
                summary.batches, summary.entities
            );
        }

        writer.finish()?;
        flush(&mut writer, sink).await?;

        summary.bytes = writer.bytes_written();
        info!(
            "Export finished: {} entities in {} batches, {} bytes",
            summary.entities, summary.batches, summary.bytes
        );
        Ok(summary)
    }

    /// Taxonomies of the selected non-post types that are not written in a
    /// block of their own
    fn custom_taxonomies(&self, content_types: &[String], menus: bool) -> Vec<String> {
        let mut taxonomies: Vec<String> = Vec::new();
        for content_type in content_types.iter().filter(|t| t.as_str() != POST_TYPE) {
            for taxonomy in self.config.taxonomies_for(content_type) {
                let own_block = taxonomy == CATEGORY_TAXONOMY
                    || taxonomy == TAG_TAXONOMY
                    || (menus && taxonomy == NAV_MENU_TAXONOMY);
                if !own_block && !taxonomies.contains(taxonomy) {
                    taxonomies.push(taxonomy.clone());
                }
            }
        }
        taxonomies
    }

    async fn item_record(
        &self,
        entity: Entity,
        sticky: &HashSet<i64>,
    ) -> Result<ItemRecord, ExportError> {
        let taxonomies = self.config.taxonomies_for(&entity.post_type);
        let terms = if taxonomies.is_empty() {
            Vec::new()
        } else {
            self.repo.entity_terms(entity.id, taxonomies).await?
        };

        let meta = self.repo.fetch_metadata(entity.id).await?;
        let attachment_url = entity
            .is_attachment()
            .then(|| self.attachment_url(&entity, &meta));
        let meta: Vec<MetaEntry> = meta
            .into_iter()
            .filter(|m| !self.hooks.skips_postmeta(m))
            .collect();

        let mut comments = Vec::new();
        for comment in self.repo.fetch_comments(entity.id).await? {
            let meta = self
                .repo
                .fetch_comment_metadata(comment.id)
                .await?
                .into_iter()
                .filter(|m| !self.hooks.skips_commentmeta(m))
                .collect();
            comments.push(CommentRecord { comment, meta });
        }

        Ok(ItemRecord {
            title: self.hooks.title.apply(entity.title.clone(), &entity),
            content: self.hooks.content.apply(entity.content.clone(), &entity),
            excerpt: self.hooks.excerpt.apply(entity.excerpt.clone(), &entity),
            link: entity.permalink(self.site.blog_url()),
            is_sticky: sticky.contains(&entity.id),
            attachment_url,
            terms,
            meta,
            comments,
            entity,
        })
    }

    fn attachment_url(&self, entity: &Entity, meta: &[MetaEntry]) -> String {
        let file = meta
            .iter()
            .find(|m| m.key == ATTACHED_FILE_META_KEY && !m.value.is_empty());
        match file {
            Some(m) if m.value.starts_with("http://") || m.value.starts_with("https://") => {
                m.value.clone()
            }
            Some(m) => format!(
                "{}/{}",
                self.site.uploads_url(),
                m.value.trim_start_matches('/')
            ),
            None => entity.guid.clone(),
        }
    }
}

async fn flush<S>(writer: &mut WxrWriter, sink: &mut S) -> Result<(), ExportError>
where
    S: ExportSink + ?Sized,
{
    let chunk = writer.take_chunk();
    if chunk.is_empty() {
        return Ok(());
    }
    sink.write_chunk(chunk).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{ContentFixture, NewPost};
    use crate::db::repositories::{EntityQuery, SqlxContentRepository, STICKY_POSTS_OPTION};
    use crate::export::hooks::PRIORITY_DEFAULT;
    use crate::export::sink::VecSink;
    use crate::models::{Author, Comment, Term};
    use async_trait::async_trait;
    use quick_xml::Reader;
    use std::sync::Mutex;

    /// Delegates to the SQLite repository and records entity batch sizes
    struct RecordingRepository {
        inner: SqlxContentRepository,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ContentRepository for RecordingRepository {
        async fn query_entities(&self, query: &EntityQuery) -> anyhow::Result<Vec<i64>> {
            self.inner.query_entities(query).await
        }
        async fn query_attachments(&self, parent_ids: &[i64]) -> anyhow::Result<Vec<i64>> {
            self.inner.query_attachments(parent_ids).await
        }
        async fn fetch_entities(&self, ids: &[i64]) -> anyhow::Result<Vec<Entity>> {
            self.batches.lock().unwrap().push(ids.len());
            self.inner.fetch_entities(ids).await
        }
        async fn fetch_terms(&self, taxonomies: &[String]) -> anyhow::Result<Vec<Term>> {
            self.inner.fetch_terms(taxonomies).await
        }
        async fn fetch_categories(&self) -> anyhow::Result<Vec<Term>> {
            self.inner.fetch_categories().await
        }
        async fn fetch_tags(&self) -> anyhow::Result<Vec<Term>> {
            self.inner.fetch_tags().await
        }
        async fn fetch_nav_menus(&self) -> anyhow::Result<Vec<Term>> {
            self.inner.fetch_nav_menus().await
        }
        async fn find_term(&self, id: i64, taxonomy: &str) -> anyhow::Result<Option<Term>> {
            self.inner.find_term(id, taxonomy).await
        }
        async fn entity_terms(
            &self,
            entity_id: i64,
            taxonomies: &[String],
        ) -> anyhow::Result<Vec<Term>> {
            self.inner.entity_terms(entity_id, taxonomies).await
        }
        async fn fetch_metadata(&self, entity_id: i64) -> anyhow::Result<Vec<MetaEntry>> {
            self.inner.fetch_metadata(entity_id).await
        }
        async fn fetch_comments(&self, entity_id: i64) -> anyhow::Result<Vec<Comment>> {
            self.inner.fetch_comments(entity_id).await
        }
        async fn fetch_comment_metadata(&self, comment_id: i64) -> anyhow::Result<Vec<MetaEntry>> {
            self.inner.fetch_comment_metadata(comment_id).await
        }
        async fn distinct_authors(&self, entity_ids: &[i64]) -> anyhow::Result<Vec<Author>> {
            self.inner.distinct_authors(entity_ids).await
        }
        async fn sticky_ids(&self) -> anyhow::Result<Vec<i64>> {
            self.inner.sticky_ids().await
        }
    }

    struct ClosedSink;

    #[async_trait]
    impl ExportSink for ClosedSink {
        async fn write_chunk(&mut self, _chunk: Vec<u8>) -> Result<(), ExportError> {
            Err(ExportError::serialization("export stream closed by the client"))
        }
    }

    fn assert_well_formed(xml: &str) {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed XML at {}: {}\n{}", reader.buffer_position(), e, xml),
            }
        }
    }

    fn exporter(fx: &ContentFixture, hooks: ExportHooks) -> Exporter {
        Exporter::new(
            SqlxContentRepository::boxed(fx.pool()),
            Arc::new(hooks),
            SiteConfig::default(),
            ExportConfig::default(),
        )
    }

    async fn run(exporter: &Exporter, filter: ExportFilter) -> (ExportSummary, String) {
        let mut sink = VecSink::new();
        let summary = exporter.export(filter, &mut sink).await.expect("export failed");
        let xml = sink.to_string_lossy();
        assert_well_formed(&xml);
        (summary, xml)
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("My Site"), "mysite");
        assert_eq!(sanitize_key("Tom & Jerry's_Blog-2"), "tomjerrys_blog-2");
        assert_eq!(sanitize_key("日本"), "");
    }

    #[tokio::test]
    async fn test_filename() {
        let fx = ContentFixture::new().await;
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let mut exporter = exporter(&fx, ExportHooks::new());
        assert_eq!(exporter.filename(today), "mysite.wordpress.2024-03-05.xml");

        exporter.site.title = "!!!".to_string();
        assert_eq!(exporter.filename(today), "wordpress.2024-03-05.xml");
    }

    #[tokio::test]
    async fn test_empty_filter_writes_empty_channel() {
        let fx = ContentFixture::new().await;
        fx.user(1, "alice").await;
        fx.post(NewPost::new("post", "2024-01-01 10:00:00").author(1)).await;

        let (summary, xml) = run(&exporter(&fx, ExportHooks::new()), ExportFilter::default()).await;

        assert_eq!(summary.entities, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.bytes, xml.len() as u64);
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
        assert!(xml.contains("<wp:author_login>alice</wp:author_login>"));
    }

    #[tokio::test]
    async fn test_batches_of_configured_size() {
        let fx = ContentFixture::new().await;
        for day in 1..=45 {
            fx.post(NewPost::new("post", &format!("2024-01-01 10:{:02}:00", day)))
                .await;
        }
        let repo = Arc::new(RecordingRepository {
            inner: SqlxContentRepository::new(fx.pool()),
            batches: Mutex::new(Vec::new()),
        });
        let exporter = Exporter::new(
            repo.clone(),
            Arc::new(ExportHooks::new()),
            SiteConfig::default(),
            ExportConfig::default(),
        );

        let (summary, xml) = run(&exporter, ExportFilter::for_types(&["post"])).await;

        assert_eq!(*repo.batches.lock().unwrap(), vec![20, 20, 5]);
        assert_eq!(summary.entities, 45);
        assert_eq!(summary.batches, 3);
        assert_eq!(xml.matches("<item>").count(), 45);
    }

    #[tokio::test]
    async fn test_item_contents() {
        let fx = ContentFixture::new().await;
        fx.user(1, "alice").await;
        fx.term(Term::new(1, CATEGORY_TAXONOMY, "news", "News")).await;
        fx.term(Term::new(2, CATEGORY_TAXONOMY, "local", "Local").with_parent(1)).await;
        fx.term(Term::new(3, TAG_TAXONOMY, "rust", "Rust")).await;
        let id = fx
            .post(
                NewPost::new("post", "2024-01-01 10:00:00")
                    .author(1)
                    .title("Hello")
                    .content("Body ]]> text")
                    .name("hello"),
            )
            .await;
        fx.relate(id, 2).await;
        fx.relate(id, 3).await;
        fx.meta(id, "_edit_lock", "1700000000:1").await;
        fx.meta(id, "color", "blue").await;
        let approved = fx.comment(id, "Ann", "Great post", "1").await;
        fx.comment(id, "Bot", "Buy now", "spam").await;
        fx.comment_meta(approved, "rating", "5").await;
        fx.option(STICKY_POSTS_OPTION, &format!("[{}]", id)).await;

        let (summary, xml) = run(&exporter(&fx, ExportHooks::new()), ExportFilter::for_types(&["post"])).await;

        assert_eq!(summary.entities, 1);
        assert!(xml.contains("<wp:author_login>alice</wp:author_login>"));
        let parent = xml.find("<wp:category_nicename>news</wp:category_nicename>").unwrap();
        let child = xml.find("<wp:category_nicename>local</wp:category_nicename>").unwrap();
        assert!(parent < child);
        assert!(xml.contains("<wp:category_parent>news</wp:category_parent>"));
        assert!(xml.contains("<wp:tag_slug>rust</wp:tag_slug>"));
        assert!(xml.contains(&format!("<link>http://localhost/?p={}</link>", id)));
        assert!(xml.contains("<content:encoded><![CDATA[Body ]]]]><![CDATA[> text]]></content:encoded>"));
        assert!(xml.contains("<category domain=\"category\" nicename=\"local\"><![CDATA[Local]]></category>"));
        assert!(xml.contains("<category domain=\"post_tag\" nicename=\"rust\"><![CDATA[Rust]]></category>"));
        assert!(xml.contains("<wp:is_sticky>1</wp:is_sticky>"));
        assert!(xml.contains("<wp:meta_key>color</wp:meta_key>"));
        assert!(!xml.contains("_edit_lock"));
        assert!(xml.contains("Great post"));
        assert!(!xml.contains("Buy now"));
        assert!(xml.contains("<wp:meta_key>rating</wp:meta_key>"));
    }

    #[tokio::test]
    async fn test_claimed_category_is_the_only_category_written() {
        let fx = ContentFixture::new().await;
        fx.term(Term::new(1, CATEGORY_TAXONOMY, "news", "News")).await;
        fx.term(Term::new(2, CATEGORY_TAXONOMY, "sport", "Sport")).await;
        let inside = fx.post(NewPost::new("post", "2024-01-01 10:00:00").title("Inside")).await;
        let outside = fx.post(NewPost::new("post", "2024-01-02 10:00:00").title("Outside")).await;
        fx.relate(inside, 1).await;
        fx.relate(outside, 2).await;

        let mut filter = ExportFilter::for_types(&["post"]);
        filter.category = Some(1);
        let (_, xml) = run(&exporter(&fx, ExportHooks::new()), filter).await;

        assert!(xml.contains("<wp:category_nicename>news</wp:category_nicename>"));
        assert!(!xml.contains("<wp:category_nicename>sport</wp:category_nicename>"));
        assert!(xml.contains("<title>Inside</title>"));
        assert!(!xml.contains("<title>Outside</title>"));
    }

    #[tokio::test]
    async fn test_attachment_url() {
        let fx = ContentFixture::new().await;
        let post = fx.post(NewPost::new("post", "2024-01-01 10:00:00")).await;
        let image = fx
            .post(
                NewPost::new("attachment", "2024-01-01 10:00:00")
                    .status("inherit")
                    .parent(post)
                    .guid("http://localhost/cat.jpg"),
            )
            .await;
        fx.meta(image, ATTACHED_FILE_META_KEY, "2024/01/cat.jpg").await;
        fx.post(
            NewPost::new("attachment", "2024-01-01 10:00:00")
                .status("inherit")
                .parent(post)
                .guid("http://localhost/dog.jpg"),
        )
        .await;

        let (summary, xml) = run(&exporter(&fx, ExportHooks::new()), ExportFilter::for_types(&["post"])).await;

        assert_eq!(summary.entities, 3);
        assert!(xml.contains(
            "<wp:attachment_url>http://localhost/wp-content/uploads/2024/01/cat.jpg</wp:attachment_url>"
        ));
        assert!(xml.contains("<wp:attachment_url>http://localhost/dog.jpg</wp:attachment_url>"));
    }

    #[tokio::test]
    async fn test_menus_and_custom_terms() {
        let fx = ContentFixture::new().await;
        fx.term(Term::new(1, NAV_MENU_TAXONOMY, "main", "Main Menu")).await;
        fx.term(Term::new(2, CATEGORY_TAXONOMY, "news", "News")).await;
        let item = fx.post(NewPost::new("nav_menu_item", "2024-01-01 10:00:00")).await;
        fx.relate(item, 1).await;

        let mut filter = ExportFilter::for_types(&["nav_menu_item"]);
        filter.menus = true;
        let (_, xml) = run(&exporter(&fx, ExportHooks::new()), filter).await;

        assert_eq!(xml.matches("<wp:term_slug>main</wp:term_slug>").count(), 1);
        assert!(xml.contains("<wp:term_taxonomy>nav_menu</wp:term_taxonomy>"));
        assert!(xml.contains("<category domain=\"nav_menu\" nicename=\"main\"><![CDATA[Main Menu]]></category>"));
        assert!(!xml.contains("<wp:category>"));

        let (_, xml) = run(
            &exporter(&fx, ExportHooks::new()),
            ExportFilter::for_types(&["nav_menu_item"]),
        )
        .await;
        assert_eq!(xml.matches("<wp:term_slug>main</wp:term_slug>").count(), 1);
        assert!(xml.contains("<wp:term_name><![CDATA[Main Menu]]></wp:term_name>"));
    }

    #[tokio::test]
    async fn test_hooks_are_applied() {
        let fx = ContentFixture::new().await;
        let keep = fx.post(NewPost::new("post", "2024-01-01 10:00:00").title("keep")).await;
        let dropped = fx.post(NewPost::new("post", "2024-01-02 10:00:00").title("drop")).await;
        fx.meta(keep, "secret", "42").await;
        fx.meta(keep, "public", "yes").await;

        let mut hooks = ExportHooks::new();
        hooks.export_args.register(
            |mut filter: ExportFilter, _: &()| {
                filter.content_types = vec![POST_TYPE.to_string()];
                filter
            },
            PRIORITY_DEFAULT,
        );
        hooks.post_ids.register(
            move |ids: Vec<i64>, _: &ExportFilter| {
                ids.into_iter().filter(|id| *id != dropped).collect()
            },
            PRIORITY_DEFAULT,
        );
        hooks
            .skip_postmeta
            .register(|skip, meta: &MetaEntry| skip || meta.key == "secret", PRIORITY_DEFAULT);
        hooks
            .title
            .register(|title: String, _: &Entity| title.to_uppercase(), PRIORITY_DEFAULT);

        let (summary, xml) = run(&exporter(&fx, hooks), ExportFilter::for_types(&["page"])).await;

        assert_eq!(summary.entities, 1);
        assert!(xml.contains("<title>KEEP</title>"));
        assert!(!xml.contains("DROP"));
        assert!(!xml.contains("secret"));
        assert!(xml.contains("<wp:meta_key>public</wp:meta_key>"));
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_export() {
        let fx = ContentFixture::new().await;
        fx.post(NewPost::new("post", "2024-01-01 10:00:00")).await;

        let err = exporter(&fx, ExportHooks::new())
            .export(ExportFilter::for_types(&["post"]), &mut ClosedSink)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Serialization(_)));
    }
}
