pub mod api;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod languages;
pub mod shutdown;
pub mod worker;
pub mod workflow;
