//! mediadex, a local media asset catalog with hybrid search.
//!
//! The library is organized around three services sharing an injected
//! [`db::Database`] handle: the folder [`indexer`], the hybrid
//! [`search`] executor, and the embedding gateway client in [`embed`].

pub mod config;
pub mod db;
pub mod embed;
pub mod indexer;
pub mod logging;
pub mod search;
