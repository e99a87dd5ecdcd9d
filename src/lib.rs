pub mod certificate;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod rules;
pub mod rules_service;
pub mod scheduler;
pub mod scoring;
pub mod service;
pub mod state;
pub mod store;
pub mod truck;
pub mod truck_service;
pub mod types;
pub mod utils;
pub mod violation;
