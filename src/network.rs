//! Network-reachability seam
//!
//! The host supplies the oracle; the session core only ever asks "is the
//! network reachable right now". When a failure is handled while the network
//! is unreachable, no retry is armed; recovery then depends on the host
//! wiring its connectivity-restored signal to
//! [`SessionCoordinator::resume_last`](crate::session::SessionCoordinator::resume_last).

/// Reachability oracle consulted before arming a reconnect
pub trait NetworkObserver: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Trivial observer for hosts without a reachability signal; always reports
/// the network as reachable, so retries keep firing on their own schedule.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReachable;

impl NetworkObserver for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}
