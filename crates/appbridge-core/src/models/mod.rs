//! Data models shared by discovery, the endpoint store and the router.

mod content_app;
mod endpoint;
mod record;

pub use content_app::*;
pub use endpoint::*;
pub use record::*;
