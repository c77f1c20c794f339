pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod parsers;
pub mod resilience;
pub mod response;
pub mod server;
pub mod tokens;
pub mod tools;
pub mod usage;
