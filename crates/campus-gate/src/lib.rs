//! campus-gate - session and role gating
//!
//! Decides, for every screen of the academic records front-end, whether it
//! renders, redirects or waits:
//! - **Gate**: pure priority-ordered decision over identity, profile and permitted roles
//! - **Routes**: the screen table and root/fallback handling
//! - **Session**: explicit session context fed by identity and profile events,
//!   with a last-known profile cache for offline use
//! - **Registration / approval**: the profile lifecycle the gate reads
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_gate::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = GateConfig::default();
//! let identity = Arc::new(MemoryIdentityProvider::new());
//! let store = Arc::new(MemoryProfileStore::new());
//!
//! let session = SessionDriver::new(&config, identity.clone(), store, ProfileCache::from_config(&config))
//!     .spawn(config.event_buffer);
//!
//! identity.sign_in(Identity::new("t1"));
//! let snapshot = session.wait_for(|s| !s.profile.is_pending()).await.unwrap();
//! let decision = snapshot.resolve(&RouteTable::standard(), "/teacher/grades");
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod approval;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod gate;
pub mod registration;
pub mod routes;
pub mod scenario;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use cache::ProfileCache;
pub use config::GateConfig;
pub use error::{
    ApprovalError, ConfigError, GateError, GateResult, LoginError, RegistrationError,
    SessionError, StoreError,
};
pub use gate::{evaluate, landing, GateDecision, GateInput};
pub use routes::{Access, RouteMatch, RouteTable, Screen};
pub use session::{
    FetchTicket, Followup, SessionContext, SessionDriver, SessionEvent, SessionHandle,
    SessionSnapshot,
};
pub use types::{Identity, ProfileState, Role, RoleValue, SessionProfile, Uid};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with campus-gate
    pub use crate::collaborators::{
        IdentityEvent, IdentityProvider, MemoryIdentityProvider, MemoryProfileStore, ProfileStore,
    };
    pub use crate::{
        evaluate, GateConfig, GateDecision, GateInput, Identity, ProfileCache, ProfileState,
        Role, RoleValue, RouteTable, SessionContext, SessionDriver, SessionEvent,
        SessionHandle, SessionProfile, SessionSnapshot, Uid,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
