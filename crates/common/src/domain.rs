mod message;
mod registry;
mod result;
mod thing;

pub use message::*;
pub use registry::*;
pub use result::*;
pub use thing::*;
