pub mod config;
pub mod dispatch;
pub mod notify;
pub mod queue;
pub mod routes;
pub mod sandbox;
pub mod store;
pub mod web_server;
pub mod worker;
