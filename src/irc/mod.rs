pub mod channel;
pub mod codec;
pub mod handlers;
pub mod message;
pub mod replies;
pub mod server;
