mod access_logger;
mod health_monitor;
mod http_handler;
mod route;

pub use access_logger::{AccessLogEntry, AccessLogger};
pub use health_monitor::HealthMonitor;
pub use http_handler::{error_response, HttpHandler, HttpRequest, HttpResponse, Middleware};
pub use route::Route;
