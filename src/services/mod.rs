pub mod applier;
pub mod cache;
pub mod correlation;
pub mod partitions;
pub mod queue;
pub mod store;
