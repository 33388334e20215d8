pub mod descriptor_store;
pub mod engine;
pub mod events;
pub mod queue;
pub mod remote;
pub mod staging;
pub mod transfer;
