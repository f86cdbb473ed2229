//! wxr-export - Filtered WordPress eXtended RSS export service
//!
//! Reads a WordPress-shaped content store and streams a filtered subset of
//! it as a WXR document.

pub mod api;
pub mod config;
pub mod db;
pub mod export;
pub mod models;
