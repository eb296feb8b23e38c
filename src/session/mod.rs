//! Managed session lifecycle
//!
//! The session core: lifecycle states, the retry delay schedule, the
//! per-identity connection state machine, the registry enforcing the single
//! live slot, inbound message routing, and the [`SessionCoordinator`]
//! façade hosts drive.

pub mod backoff;
pub mod coordinator;
pub mod inbound;
pub mod machine;
pub mod registry;
pub mod state;

pub use backoff::{ReconnectSchedule, RETRY_DELAYS_SECS};
pub use coordinator::SessionCoordinator;
pub use inbound::{InboundMessage, InboundRouter};
pub use machine::{ConnectOutcome, ConnectionStateMachine, SessionNotice};
pub use registry::ClientRegistry;
pub use state::{ConnectionState, FailureKind};
