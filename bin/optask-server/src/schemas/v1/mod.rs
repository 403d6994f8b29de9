pub mod engine;
pub mod task;
