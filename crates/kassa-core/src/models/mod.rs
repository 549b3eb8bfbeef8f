//! Data models shared by the pipeline stages.

pub mod category;
pub mod config;
pub mod document;
pub mod record;
