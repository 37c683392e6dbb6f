pub mod account;
pub mod chain;
pub mod config;
pub mod deployment;
pub mod listener;
pub mod orchestrator;
pub mod swap;
pub mod tx;

#[cfg(test)]
mod testing;
