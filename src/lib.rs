//! Atomic multi-surface commit transactions for a Wayland compositor.
//!
//! Surfaces queue protocol state between commits. A
//! [`transaction::Transaction`] collects the queued state of one or more
//! surfaces into an atomic batch. Committed batches apply in an order that
//! preserves per-surface commit order, updates ancestor surfaces before
//! their sub-surfaces, and never applies a batch while one of its surfaces
//! still has an older unapplied batch.

#[macro_use]
mod macros;

pub mod compositor;
pub mod surface;
pub mod transaction;
mod utils;
