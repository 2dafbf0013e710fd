pub mod scope_lock;

pub use scope_lock::ScopeLockRegistry;
