pub mod context;
pub mod http;
pub mod pipeline;

pub use context::BoxBody;
pub use http::handle_request;
