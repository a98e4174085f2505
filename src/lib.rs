pub mod config;
pub mod mqtt;
pub mod terminal;
