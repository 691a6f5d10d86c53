mod api_server;
mod http_server;
mod tls;

pub use api_server::{ApiServer, ApiState, RegisterServerRequest, RegisterServerResponse, API_PROVIDER};
pub use http_server::{HttpProto, HttpServer};
pub use tls::TlsConfig;

pub(crate) use http_server::same_route;
