pub mod api;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod curriculum;
pub mod enrollment;
pub mod error;
pub mod policy;
pub mod progress;
pub mod quiz;
pub mod school;
pub mod server;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_util;
