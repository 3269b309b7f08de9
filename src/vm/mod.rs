pub mod engine;
pub mod node;
