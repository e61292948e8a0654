pub mod config;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod seed;
pub mod snapshot;
pub mod stamp;
pub mod store;
