//! Secure binding to the external agent process.
//!
//! Candidates answering the bind action are filtered by mutual permission
//! verification, then narrowed to system-image services, then the first one
//! wins. Connecting happens on a background task; callers that need the
//! channel wait on a one-shot gate with an interrupt escape.

mod candidate;
mod gate;
mod secure_binder;

pub use candidate::{select_candidate, ServiceCandidate, ServiceResolver};
pub use gate::ChannelGate;
pub use secure_binder::{AgentConnector, BindState, SecureServiceBinder};
