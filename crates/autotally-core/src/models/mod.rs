//! Data models: documents moving through the pipeline, extracted records,
//! configuration.

pub mod bank;
pub mod config;
pub(crate) mod de;
pub mod document;
pub mod invoice;
pub mod schema;
