pub mod amqp;
pub mod domain;
pub mod message_gateway;

pub use amqp::*;
pub use domain::*;
pub use message_gateway::*;
