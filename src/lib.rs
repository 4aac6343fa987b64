// Library for tests to access modules

pub mod command_line;
pub mod config;
pub mod docker_repo;
pub mod error;
pub mod exec;
pub mod hub;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod scheduler;
pub mod subscriptions;
pub mod version;
pub mod worker;
