pub mod config;
pub mod languages;
pub mod types;
pub mod validation;
