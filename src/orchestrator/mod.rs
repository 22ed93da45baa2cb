//! Run lifecycle orchestration.
//!
//! This module owns selection and the timed session for one runnable: it opens the
//! store, launches the child, keeps the stored total current and finalizes it once the
//! child exits. CLI layers consume the emitted session events for presentation.

mod session;

pub(crate) use session::random_run;
