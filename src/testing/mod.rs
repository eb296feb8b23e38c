//! Test support utilities
//!
//! In-memory doubles for every external seam: transport, storage, network
//! reachability, app state, and notification presentation. Used by the unit
//! and integration tests; not part of the stable API.

pub mod mocks;
