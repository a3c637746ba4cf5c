pub mod api;
pub mod config;
pub mod error;
pub mod families;
pub mod graph;
pub mod lang;
pub mod langlinks;
pub mod page_index;
pub mod plan;
pub mod redirects;
pub mod resolver;
pub mod runtime;
pub mod store;
