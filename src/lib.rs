// ssl-checker: concurrent TLS certificate health checks
// Exposes the core functionality of the ssl-checker application as a library

pub mod aggregator;
pub mod app;
pub mod certificate;
pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod logging;
pub mod presenter;
pub mod prober;
pub mod resolver;
pub mod scheduler;
pub mod tls;
pub mod validation;
