pub mod config;
pub mod copy;
pub mod error;
pub mod intermediate;
pub mod mapping;
pub mod registry;
pub mod runner;
pub mod set_store;
pub mod sql;
pub mod step;
pub mod traits;
pub mod value;
