//! The editor core: the iframe-side agent, the host-side coordinator, and
//! the protocol plumbing that connects them across the document boundary.

pub mod agent;
pub mod channel;
pub mod coordinator;
pub mod highlight;
pub mod protocol;

pub use agent::{Agent, Modifiers, PointerEvent};
pub use coordinator::{Coordinator, SelectedElementRecord};
