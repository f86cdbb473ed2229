//! Export engine
//!
//! Turns export criteria into a WordPress eXtended RSS document:
//!
//! - [`filter`]: typed criteria from raw request input
//! - [`planner`]: criteria to an ordered entity ID list
//! - [`hierarchy`]: parent-before-child term ordering
//! - [`writer`] and [`cdata`]: the forward-only XML emitter
//! - [`exporter`]: the run itself, from hooks to footer
//! - [`sink`]: where the document goes

pub mod cdata;
pub mod error;
pub mod exporter;
pub mod filter;
pub mod hierarchy;
pub mod hooks;
pub mod planner;
pub mod sink;
pub mod writer;

pub use error::ExportError;
pub use exporter::{sanitize_key, ExportSummary, Exporter};
pub use filter::{DateRange, ExportFilter, RawExportRequest, YearMonth};
pub use hierarchy::{resolve_hierarchy, ResolvedTerms};
pub use hooks::ExportHooks;
pub use planner::{ExportPlan, QueryPlanner};
pub use sink::{ChannelSink, ExportSink, VecSink};
pub use writer::WxrWriter;
