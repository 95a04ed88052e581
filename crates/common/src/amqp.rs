mod backoff;
mod client;
mod connection;
mod state;
mod traits;

pub use backoff::*;
pub use client::*;
pub use connection::*;
pub use state::*;
pub use traits::*;
