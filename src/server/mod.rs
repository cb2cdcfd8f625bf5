pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle, MAX_HEADERS};
pub use request::{parse_request, ParsedRequest};
pub use service::{AppService, Server, ServerBuilder};
