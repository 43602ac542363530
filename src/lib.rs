pub mod backend;
pub mod config;
pub mod notify;
pub mod patcher;
pub mod settings;
pub mod setup;
pub mod side_store;
pub mod state;
pub mod units;
