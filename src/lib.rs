pub mod config;
pub mod dom;
pub mod draft_sim;
pub mod engine;
pub mod http_client;
pub mod identity;
pub mod kv_store;
pub mod logging;
pub mod overlay;
pub mod providers;
pub mod release_dates;
pub mod selector;
pub mod site;
pub mod stats;
pub mod worker;
