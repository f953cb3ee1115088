//! Reconciliation of optimistic local edits with a remote authority.
//!
//! [`SyncDocument`] is the synchronous state machine. [`SessionHandle`] runs
//! one per document on tokio, connected to an [`Authority`] such as
//! [`MemoryAuthority`].

pub mod authority;
pub mod document;
pub mod retry;
pub mod session;

pub use authority::{Authority, Checkout, MemoryAuthority};
pub use document::{Origin, RemoteMutation, SyncDocument, SyncEvent, SyncState};
pub use retry::{retry, RetryConfig};
pub use session::{DocumentSnapshot, SessionHandle};
