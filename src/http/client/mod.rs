pub mod hyper_client;
pub mod request;

pub use hyper_client::{create_client, HyperClient};
pub use request::{get, post_json, send, send_streaming, Response};
