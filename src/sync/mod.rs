//! Keeping a local transcript consistent with the server of record.
//!
//! `reconcile` is the pure merge; `Session` owns one conversation's
//! transcript together with its sync cursor and is the only thing that
//! mutates either.

mod reconcile;
mod session;

pub use reconcile::reconcile;
pub use session::Session;
