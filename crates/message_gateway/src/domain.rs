mod requests;
mod thing_controller;
mod thing_events;
mod thing_service;

pub use requests::*;
pub use thing_controller::*;
pub use thing_events::*;
pub use thing_service::*;
