//! Export filter model
//!
//! Turns the admin form's raw query parameters into typed export criteria.
//! Parsing is lenient the way form input usually is: unknown content types
//! are dropped and unusable dates or statuses are ignored. Only a numeric
//! field that is not a number is rejected.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::ExportError;
use crate::config::ExportConfig;

/// Sentinel content token selecting navigation menu terms
pub const MENUS_TOKEN: &str = "menus";
/// Content token selecting every exportable type plus menus
pub const ALL_TOKEN: &str = "all";
/// Content type that the category filter applies to
pub const POST_TYPE: &str = "post";

/// Raw export parameters as submitted by the admin form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExportRequest {
    /// `content[]` values, in submission order
    #[serde(default)]
    pub content: Vec<String>,
    /// `cat`
    #[serde(default)]
    pub category: Option<String>,
    /// `post_author`
    #[serde(default)]
    pub author: Option<String>,
    /// `post_start_date` (`YYYY-MM`)
    #[serde(default)]
    pub start_date: Option<String>,
    /// `post_end_date` (`YYYY-MM`)
    #[serde(default)]
    pub end_date: Option<String>,
    /// `post_status`
    #[serde(default)]
    pub status: Option<String>,
}

impl RawExportRequest {
    /// Collect decoded query pairs
    ///
    /// `content` may be repeated, with or without the `[]` suffix. Unknown
    /// parameters are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut request = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "content" | "content[]" => request.content.push(value),
                "cat" => request.category = Some(value),
                "post_author" => request.author = Some(value),
                "post_start_date" => request.start_date = Some(value),
                "post_end_date" => request.end_date = Some(value),
                "post_status" => request.status = Some(value),
                _ => {}
            }
        }

        request
    }
}

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    first_day: NaiveDate,
}

impl YearMonth {
    /// Create a month, `None` when out of range
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    /// Parse `YYYY-MM`; anything after a second `-` is ignored
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('-');
        let year = parts.next()?.trim().parse::<i32>().ok()?;
        let month = parts.next()?.trim().parse::<u32>().ok()?;
        if year <= 0 {
            return None;
        }
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// Midnight on the first day of the month
    pub fn start(&self) -> NaiveDateTime {
        self.first_day.and_time(NaiveTime::MIN)
    }

    /// Midnight on the first day of the following month
    pub fn next_month_start(&self) -> Option<NaiveDateTime> {
        self.first_day
            .checked_add_months(Months::new(1))
            .map(|d| d.and_time(NaiveTime::MIN))
    }

    /// Last calendar day of the month
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.first_day
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// Inclusive range of whole months
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<YearMonth>,
    pub end: Option<YearMonth>,
}

impl DateRange {
    /// Inclusive lower bound on the entity date
    pub fn lower_bound(&self) -> Option<NaiveDateTime> {
        self.start.map(|m| m.start())
    }

    /// Exclusive upper bound on the entity date
    pub fn upper_bound(&self) -> Option<NaiveDateTime> {
        self.end.and_then(|m| m.next_month_start())
    }

    /// Whether a date falls inside the range
    pub fn contains(&self, date: NaiveDateTime) -> bool {
        self.lower_bound().map_or(true, |lo| date >= lo)
            && self.upper_bound().map_or(true, |hi| date < hi)
    }
}

/// Typed export criteria
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilter {
    /// Selected content types, de-duplicated, in request order
    pub content_types: Vec<String>,
    /// Whether navigation menu terms are exported
    pub menus: bool,
    /// Category term ID restricting posts
    pub category: Option<i64>,
    /// Owning user ID
    pub author: Option<i64>,
    pub date_range: Option<DateRange>,
    /// Single status; `None` means every status except `auto-draft`
    pub status: Option<String>,
}

impl ExportFilter {
    /// Filter selecting the given content types and nothing else
    pub fn for_types(types: &[&str]) -> Self {
        Self {
            content_types: types.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Build a filter from raw form input
    ///
    /// # Errors
    ///
    /// Returns `ExportError::InvalidFilter` when `post_author` or `cat` is not
    /// an integer.
    pub fn from_request(
        raw: &RawExportRequest,
        registry: &ExportConfig,
    ) -> Result<Self, ExportError> {
        let mut filter = Self::default();

        for token in &raw.content {
            let token = match token.trim() {
                "posts" => POST_TYPE,
                "pages" => "page",
                other => other,
            };

            if token == ALL_TOKEN {
                filter.menus = true;
                for content_type in registry.content_types.iter().filter(|t| t.exportable) {
                    if !filter.includes(&content_type.name) {
                        filter.content_types.push(content_type.name.clone());
                    }
                }
            } else if token == MENUS_TOKEN {
                filter.menus = true;
            } else if !registry.is_exportable(token) {
                debug!("Dropping content type '{}': not registered for export", token);
            } else if !filter.includes(token) {
                filter.content_types.push(token.to_string());
            }
        }

        filter.author = parse_id(raw.author.as_deref(), "post_author")?;

        let category = parse_id(raw.category.as_deref(), "cat")?;
        if filter.includes(POST_TYPE) {
            filter.category = category;
        }

        let start = parse_month(raw.start_date.as_deref(), "post_start_date");
        let end = parse_month(raw.end_date.as_deref(), "post_end_date");
        if start.is_some() || end.is_some() {
            filter.date_range = Some(DateRange { start, end });
        }

        filter.status = match raw.status.as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("all") => None,
            Some(status) if registry.is_status(status) => Some(status.to_string()),
            Some(status) => {
                warn!("Ignoring unregistered post status '{}'", status);
                None
            }
        };

        Ok(filter)
    }

    /// Whether the content type is selected
    pub fn includes(&self, content_type: &str) -> bool {
        self.content_types.iter().any(|t| t == content_type)
    }

    /// Whether no content type is selected
    pub fn is_empty(&self) -> bool {
        self.content_types.is_empty()
    }
}

fn parse_id(raw: Option<&str>, field: &str) -> Result<Option<i64>, ExportError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(value) => value,
    };

    match value.parse::<i64>() {
        Ok(0) => Ok(None),
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(ExportError::invalid_filter(format!(
            "{} must be a positive integer, got '{}'",
            field, value
        ))),
    }
}

fn parse_month(raw: Option<&str>, field: &str) -> Option<YearMonth> {
    let value = raw.map(str::trim).filter(|v| !v.is_empty())?;
    let month = YearMonth::parse(value);
    if month.is_none() {
        warn!("Ignoring {} '{}': expected YYYY-MM", field, value);
    }
    month
}
