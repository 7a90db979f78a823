pub mod configuration;
pub mod constants;
pub mod core;
pub mod domain;
pub mod dtos;
pub mod helper;
pub mod ports;
pub mod telemetry;
