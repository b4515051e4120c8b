pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod kafka;
pub mod metrics_consts;
pub mod source;

#[cfg(test)]
mod test_utils;
