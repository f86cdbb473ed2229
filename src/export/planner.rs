//! Query planner
//!
//! Resolves an [`ExportFilter`] into the ordered, de-duplicated list of
//! entity IDs to export:
//!
//! 1. posts in the requested category (when that category exists)
//! 2. every other selected content type
//! 3. attachments whose parent is already in the set

use std::collections::HashSet;

use tracing::{debug, warn};

use super::error::ExportError;
use super::filter::{ExportFilter, POST_TYPE};
use crate::config::ExportConfig;
use crate::db::repositories::{ContentRepository, EntityQuery};
use crate::models::{Term, CATEGORY_TAXONOMY};

/// Planned entity set and the context the serializer needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPlan {
    /// Content types that were queried
    pub content_types: Vec<String>,
    /// Category term that restricted the post pass
    pub category: Option<Term>,
    /// Entity IDs in export order
    pub post_ids: Vec<i64>,
}

/// Keep the first occurrence of every ID
pub fn dedup_preserving_order(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

pub struct QueryPlanner<'a> {
    repo: &'a dyn ContentRepository,
    config: &'a ExportConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(repo: &'a dyn ContentRepository, config: &'a ExportConfig) -> Self {
        Self { repo, config }
    }

    /// Resolve the filter into an export plan
    ///
    /// An empty result is not an error.
    pub async fn plan(&self, filter: &ExportFilter) -> Result<ExportPlan, ExportError> {
        let mut plan = ExportPlan {
            content_types: filter.content_types.clone(),
            ..ExportPlan::default()
        };
        let base = self.base_query(filter);
        if filter.is_empty() || base.statuses.is_empty() {
            return Ok(plan);
        }

        let mut generic_types = filter.content_types.clone();
        let mut ids = Vec::new();

        if let (Some(category_id), true) = (filter.category, filter.includes(POST_TYPE)) {
            match self.repo.find_term(category_id, CATEGORY_TAXONOMY).await? {
                Some(term) => {
                    let query = EntityQuery {
                        content_types: vec![POST_TYPE.to_string()],
                        category: Some(term.id),
                        ..base.clone()
                    };
                    ids.extend(self.repo.query_entities(&query).await?);
                    generic_types.retain(|t| t != POST_TYPE);
                    debug!("Category '{}' matched {} post(s)", term.slug, ids.len());
                    plan.category = Some(term);
                }
                None => warn!("Ignoring unknown category {}", category_id),
            }
        }

        if !generic_types.is_empty() {
            let query = EntityQuery {
                content_types: generic_types,
                ..base
            };
            ids.extend(self.repo.query_entities(&query).await?);
        }

        if !ids.is_empty() {
            ids.extend(self.repo.query_attachments(&ids).await?);
        }

        plan.post_ids = dedup_preserving_order(ids);
        Ok(plan)
    }

    fn base_query(&self, filter: &ExportFilter) -> EntityQuery {
        let statuses = match &filter.status {
            Some(status) => vec![status.clone()],
            None => self.config.default_statuses(),
        };

        EntityQuery {
            content_types: Vec::new(),
            statuses,
            author: filter.author,
            date_from: filter.date_range.and_then(|r| r.lower_bound()),
            date_before: filter.date_range.and_then(|r| r.upper_bound()),
            category: None,
        }
    }
}
