pub mod kv;
pub mod pubsub;
pub mod session;

pub use kv::{KvStore, MemoryKv};
pub use pubsub::{EventChannel, MemoryChannel, MessageStream};
pub use session::{SessionPatch, SessionStore};
