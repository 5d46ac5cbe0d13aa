//! Bot memory: durable facts about the stream and its viewers.

pub mod facts;

pub use facts::{EMPTY_LISTING, FactStore, format_listing, parse_listing};
