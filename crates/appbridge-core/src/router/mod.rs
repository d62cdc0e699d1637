//! Request routing by endpoint id.
//!
//! The [`CommandRouter`] resolves each request against the live discovery
//! set first and the persisted endpoint records second:
//!
//! - live app: the request is forwarded through a [`DispatchChannel`] and the
//!   app's response string is returned verbatim
//! - persisted but absent: a structured `{"failure":{"status":..}}` response
//! - unknown: an error in [`RouteMode::Strict`], a neutral placeholder in
//!   [`RouteMode::Permissive`]

mod channel;
mod command_router;
mod request;

pub use channel::{ChannelProvider, DispatchChannel, StaticChannel};
pub use command_router::{CommandRouter, Resolution, RouteMode};
pub use request::{RouteOperation, RouteRequest};
