pub mod cors;
pub mod dispatch;

pub use cors::build_cors_layer;
pub use dispatch::{dispatch_request, normalize_base_path};
