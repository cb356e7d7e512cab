pub mod cli;
pub mod config;
pub mod database;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod pipeline;
pub mod report;
pub mod telemetry;
