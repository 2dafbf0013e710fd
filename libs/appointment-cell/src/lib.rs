pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

pub use models::*;
pub use router::{appointment_routes, directory_routes, queue_routes};
pub use state::AppState;
pub use store::{scope_key, AppointmentStore, MemoryStore};
