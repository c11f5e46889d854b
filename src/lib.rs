pub mod config;
pub mod manager;
pub mod model;
pub mod notify;
pub mod observability;
pub mod refresh;
pub mod source;
