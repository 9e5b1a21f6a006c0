//! Shared utilities and types for feature modules

pub mod pagination;

pub use pagination::{Page, PageRequest};
