//! Operation-log engine for elicast screencasts.
//!
//! A session is a timestamped log of editor operations. The engine replays
//! logs into documents and splices new operations into the middle of an
//! existing log, remapping everything recorded afterwards. Where a later edit
//! can no longer be placed unambiguously the splice stops with a
//! [`Conflict`] and the caller retries with more resolve choices.

pub mod ambiguous;
pub mod area;
pub mod history;
pub mod io;
pub mod op;
pub mod regions;
pub mod rerecord;
pub mod splice;
pub mod text;

// Re-export key types for easier usage
pub use ambiguous::{AmbiguityKind, AmbiguousAreaSet, AmbiguousAreaSetCouple, PosRange};
pub use area::{Area, AreaError, AreaSet, AreaType};
pub use io::*;
pub use op::*;
pub use rerecord::*;
pub use splice::*;
pub use text::{LineCh, TextError, build_text, line_ch_to_pos, pos_to_line_ch};
