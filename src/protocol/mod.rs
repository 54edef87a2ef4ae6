//! Phase-event protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Transport frame
//!     → message.rs (PhaseMessage: one of six phase events)
//!     → [engine processes the event]
//!     → response.rs (ProcessingResponse of the matching phase kind)
//!     → mutations.rs (helpers that build passthrough / mutation responses)
//!     → Transport frame
//! ```
//!
//! # Design Decisions
//! - Six phases are a closed enum; the engine matches exhaustively
//! - Every inbound phase yields exactly one response of the same kind
//! - Types derive Serde so any transport can frame them

pub mod message;
pub mod mutations;
pub mod response;

pub use message::{HeaderValue, HttpBody, HttpHeaders, HttpTrailers, PhaseKind, PhaseMessage};
pub use response::{
    BodySendMode, CommonResponse, HeaderAppendAction, HeaderMutation,
    HeaderValueOption, PhaseResponse, ProcessingMode, ProcessingResponse, TrailersResponse,
};
