//! HTTP handlers for the module catalog and module records.

pub mod catalog;
pub mod records;
