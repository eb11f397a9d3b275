/// Location pack lookup.
pub mod content_store;
/// Location pack model definitions.
pub mod models;
/// Errors raised while loading packs.
pub mod storage;
