pub mod deploy;
pub mod info;
pub mod metrics;
pub mod plan;
pub mod remove;
