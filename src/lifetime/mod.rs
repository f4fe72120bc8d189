//! The `lifetime` module tracks which remote registries are alive. Peers
//! announce themselves periodically; the handler turns those announcements
//! (and their absence) into up/down events.

pub mod announcer;
pub mod handler;
pub mod remote_registry;

pub use announcer::{AliveAnnouncer, Announcement};
pub use handler::{LifetimeListener, LoggingListener, RegistryLifetimeHandler, Signal, SweepTask};
pub use remote_registry::{RemoteEntry, RemoteRegistry, Upsert};
