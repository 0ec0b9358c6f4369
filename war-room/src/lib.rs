// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod app;
pub mod audio;
pub mod config;
pub mod console;
pub mod draft;
pub mod feed;
pub mod llm;
pub mod local;
pub mod protocol;
pub mod refdata;
pub mod store;
