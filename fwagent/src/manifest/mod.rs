//! Update manifest model and parser.
//!
//! # Architecture
//!
//! ```text
//! manifest bytes ──► parser::parse ──► UpdateManifestContent
//!                        │                 ├─ update_id / compatibility (Spans)
//!                        ▼                 ├─ steps[..steps_max]
//!                   ScratchArena ◄─────────┴─ files[..files_max]
//! ```
//!
//! The content owns its arena, so every [`Span`] stays valid for as long as
//! the content exists and is discarded with it when a new manifest arrives.

mod arena;
mod model;
mod parser;

pub use arena::{ScratchArena, Span};
pub use model::{
    Compatibility, FileEntry, FileTarget, ManifestCapacity, Step, StepKind, UpdateId,
    UpdateIdentity, UpdateManifestContent, HANDLER_SWUPDATE, STEP_TYPE_INLINE,
    STEP_TYPE_REFERENCE,
};
pub use parser::parse;
