// Library for the binaries and tests

pub mod config;
pub mod history;
pub mod models;
pub mod poller;
pub mod response_cache;
pub mod routes;
pub mod rpc_client;
pub mod snapshot_store;
pub mod version;
