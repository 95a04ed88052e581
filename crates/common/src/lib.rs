pub mod amqp;
pub mod auth;
pub mod domain;
pub mod garde;
pub mod rules;
pub mod telemetry;
