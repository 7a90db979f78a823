pub mod configuration;
pub mod domain;
pub mod routes;
pub mod startup;
