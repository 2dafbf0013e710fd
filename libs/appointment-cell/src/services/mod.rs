pub mod lifecycle;
pub mod queue;
pub mod tokens;
