pub mod cache;
pub mod client;
pub mod url;

pub use cache::FetchCache;
pub use client::GerritClient;
