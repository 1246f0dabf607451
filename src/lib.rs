// socmon: powermetrics acquisition, normalization and rolling metrics (library for the binary and tests)

pub mod aggregator;
pub mod chip_spec;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod parser;
pub mod routes;
pub mod sampler;
pub mod sysinfo_repo;
pub mod version;
pub mod worker;
