//! Loopback TCP transport to the agent process.
//!
//! Length-prefixed JSON-RPC 2.0 over `127.0.0.1`:
//!
//! - **Client**: one connection per bound agent, shared by the router; replies
//!   are matched to calls by id
//! - **Server**: hosted by agent processes, answers `content_app.dispatch`
//! - **Protocol**: framing and the dispatch envelopes used by both

pub mod agent;
pub mod client;
pub mod protocol;
pub mod server;

pub use agent::{IpcDispatchChannel, TcpAgentConnector};
pub use client::AgentClient;
pub use protocol::{DispatchCall, DispatchParams, DispatchReply, ReplyError};
pub use server::{AgentServer, AgentServerHandle, ContentAppResponder};
