//! Portside client-side state mirroring.
//!
//! The distributed variant's client half: an optimistic predicted copy, an
//! authoritative copy replaced wholesale on confirmed refreshes, and a
//! refetch-on-notify sync driver. Rendering is out of scope; everything here
//! exposes read-only views for a renderer to consume.

mod mirror;
mod sync;

pub use mirror::{ClientMirror, MirrorError};
pub use sync::{NoticeSource, SnapshotSource, SyncDriver, SyncError};
