//! HTTP API handlers for taxkit-intake

pub mod chat;
pub mod customers;
pub mod events;
pub mod health;
pub mod intakes;
pub mod memories;
pub mod progress;
pub mod uploads;

pub use chat::chat_routes;
pub use customers::customer_routes;
pub use events::event_stream;
pub use health::health_routes;
pub use intakes::intake_routes;
pub use memories::memory_routes;
pub use progress::progress_stream;
pub use uploads::upload_routes;
