pub mod configuration;
pub mod handlers;
pub mod ports;
pub mod repositories;
pub mod startup;
