pub mod composer;
pub mod configuration;
pub mod cycle;
pub mod dispatcher;
pub mod domain;
pub mod registry_client;
pub mod retry;
pub mod routes;
pub mod scheduler;
pub mod startup;
pub mod telegram_client;
pub mod telemetry;
