mod reverse_proxy;
mod tracing_access_logger;

pub use reverse_proxy::ReverseProxy;
pub use tracing_access_logger::{TracingAccessLogger, ACCESS_LOG_TARGET};
