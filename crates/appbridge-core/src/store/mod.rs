//! Durable content-app → endpoint id mapping.
//!
//! The [`EndpointStore`] owns endpoint-id assignment. Records survive process
//! restarts through a [`RecordBackend`]; the default backend is SQLite
//! ([`SqliteRecordBackend`]) holding one serialized record string per app name.
//!
//! Uninstalling an app never purges its record, so a late request for an app
//! that is gone can still be recognised and answered as "unsupported endpoint".

mod backend;
mod endpoint_store;

pub use backend::{RecordBackend, SqliteRecordBackend};
pub use endpoint_store::EndpointStore;
