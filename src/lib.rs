// hetero-lb - Library root for the dispatcher binary, benches and tests

pub mod bench;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod routing;
