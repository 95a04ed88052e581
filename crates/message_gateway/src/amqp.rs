mod client_publisher;
mod consumer;
mod dispatcher;
mod logging;
mod monitor;
mod routing;

pub use client_publisher::*;
pub use consumer::*;
pub use dispatcher::*;
pub use logging::*;
pub use monitor::*;
pub use routing::*;
