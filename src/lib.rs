pub mod config;
pub mod enrich;
pub mod feed;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;
