//! Built-in service handlers.

pub mod echo;

pub use echo::EchoHandler;
