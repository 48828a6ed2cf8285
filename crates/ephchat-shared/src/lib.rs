//! Domain types and pure policies shared by the store, the client engine and
//! the terminal driver.

pub mod clock;
pub mod constants;
pub mod naming;
pub mod protocol;
pub mod retention;
pub mod types;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use protocol::{MessageRecord, StoredMessage};
pub use retention::RetentionPolicy;
pub use types::{ConnectionState, Message, MessageId, PermissionState, Role, ThreadId};
