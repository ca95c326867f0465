//! sitewall Runtime
//!
//! The background context of the blocker:
//! - Control messages (list / add / remove / block current site / block link)
//! - Dispatcher serving queued requests one at a time
//! - Install/startup hooks that rebuild the dynamic rules

mod background;
mod message;
mod runtime;
mod tab;

pub use background::{Background, ControlError};
pub use message::{Request, Response};
pub use runtime::{ControlHandle, DEFAULT_QUEUE_CAPACITY, Deferred, Dispatcher, channel};
pub use tab::{ActiveTab, NoTabs, TabHost, TabId};
