//! Session management module
//!
//! The registry decides which sessions are addressable; the manager owns every
//! per-session component and routes backend events and interactive commands.

pub mod action_channel;
pub mod command_router;
pub mod registry;
pub mod session_manager;
pub mod types;

pub use action_channel::{ActionChannel, SessionEvent, StatusInfo};
pub use command_router::{CommandRouter, InteractiveCommand};
pub use registry::SessionRegistry;
pub use session_manager::{ManagerState, SessionManager};
pub use types::{Lifecycle, Session, SessionId};
