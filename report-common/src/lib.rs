pub mod decode;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod normalize;
pub mod proto;
pub mod query;
pub mod report;
pub mod retry;
pub mod store;
