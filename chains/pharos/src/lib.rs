pub mod actions;
pub mod assets;
pub mod chain;
pub mod config;
pub mod context;
pub mod execution;
pub mod router;
pub mod sizing;
pub mod worker;
