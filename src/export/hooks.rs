//! Export hooks
//!
//! Typed extension points invoked at fixed places during an export. Each
//! slot keeps its handlers sorted by priority (lower runs first, equal
//! priorities keep registration order). An empty slot is a no-op.
//!
//! | Slot               | Invoked                                  |
//! |--------------------|------------------------------------------|
//! | `export_args`      | filter rewrite before anything runs      |
//! | `export_started`   | once the filter is final                 |
//! | `post_ids`         | rewrite of the planned entity IDs        |
//! | `skip_postmeta`    | per entity metadata entry                |
//! | `skip_commentmeta` | per comment metadata entry               |
//! | `title`            | item title before it is written          |
//! | `content`          | item body before CDATA wrapping          |
//! | `excerpt`          | item excerpt before CDATA wrapping       |

use std::sync::Arc;

use tracing::debug;

use super::filter::ExportFilter;
use crate::models::{Entity, MetaEntry};

/// Hook priority (lower = earlier)
pub const PRIORITY_EARLY: i32 = -100;
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_LATE: i32 = 100;

struct Handler<F: ?Sized> {
    callback: Arc<F>,
    priority: i32,
}

impl<F: ?Sized> Clone for Handler<F> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            priority: self.priority,
        }
    }
}

fn insert_sorted<F: ?Sized>(handlers: &mut Vec<Handler<F>>, callback: Arc<F>, priority: i32) {
    handlers.push(Handler { callback, priority });
    handlers.sort_by_key(|h| h.priority);
}

/// Slot whose handlers rewrite a value, each receiving the previous result
pub struct FilterSlot<T, C = ()> {
    name: &'static str,
    handlers: Vec<Handler<dyn Fn(T, &C) -> T + Send + Sync>>,
}

impl<T, C> FilterSlot<T, C> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    /// Register a handler
    pub fn register<F>(&mut self, callback: F, priority: i32)
    where
        F: Fn(T, &C) -> T + Send + Sync + 'static,
    {
        insert_sorted(&mut self.handlers, Arc::new(callback), priority);
        debug!("Registered '{}' handler with priority {}", self.name, priority);
    }

    /// Run every handler in priority order
    pub fn apply(&self, value: T, context: &C) -> T {
        self.handlers
            .iter()
            .fold(value, |value, handler| (handler.callback)(value, context))
    }

    /// Check if the slot has any handlers
    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }
}

impl<T, C> Clone for FilterSlot<T, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            handlers: self.handlers.clone(),
        }
    }
}

/// Slot whose handlers observe a value
pub struct ActionSlot<T> {
    name: &'static str,
    handlers: Vec<Handler<dyn Fn(&T) + Send + Sync>>,
}

impl<T> ActionSlot<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    /// Register a handler
    pub fn register<F>(&mut self, callback: F, priority: i32)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        insert_sorted(&mut self.handlers, Arc::new(callback), priority);
        debug!("Registered '{}' handler with priority {}", self.name, priority);
    }

    /// Run every handler in priority order
    pub fn fire(&self, value: &T) {
        for handler in &self.handlers {
            (handler.callback)(value);
        }
    }
}

impl<T> Clone for ActionSlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            handlers: self.handlers.clone(),
        }
    }
}

/// Metadata key that is never exported
pub const EDIT_LOCK_META_KEY: &str = "_edit_lock";

/// All export extension points
#[derive(Clone)]
pub struct ExportHooks {
    /// Rewrite the filter before planning
    pub export_args: FilterSlot<ExportFilter>,
    /// Observe the final filter
    pub export_started: ActionSlot<ExportFilter>,
    /// Rewrite the planned entity IDs
    pub post_ids: FilterSlot<Vec<i64>, ExportFilter>,
    /// Return `true` to drop an entity metadata entry
    pub skip_postmeta: FilterSlot<bool, MetaEntry>,
    /// Return `true` to drop a comment metadata entry
    pub skip_commentmeta: FilterSlot<bool, MetaEntry>,
    pub title: FilterSlot<String, Entity>,
    pub content: FilterSlot<String, Entity>,
    pub excerpt: FilterSlot<String, Entity>,
}

impl Default for ExportHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportHooks {
    /// Create hooks with every slot empty
    pub fn new() -> Self {
        Self {
            export_args: FilterSlot::new("export_args"),
            export_started: ActionSlot::new("export_started"),
            post_ids: FilterSlot::new("post_ids"),
            skip_postmeta: FilterSlot::new("skip_postmeta"),
            skip_commentmeta: FilterSlot::new("skip_commentmeta"),
            title: FilterSlot::new("title"),
            content: FilterSlot::new("content"),
            excerpt: FilterSlot::new("excerpt"),
        }
    }

    /// Whether an entity metadata entry is left out of the document
    ///
    /// The edit lock is dropped before any handler runs.
    pub fn skips_postmeta(&self, meta: &MetaEntry) -> bool {
        meta.key == EDIT_LOCK_META_KEY || self.skip_postmeta.apply(false, meta)
    }

    /// Whether a comment metadata entry is left out of the document
    pub fn skips_commentmeta(&self, meta: &MetaEntry) -> bool {
        self.skip_commentmeta.apply(false, meta)
    }
}
