//! Command dispatch
//!
//! Handler registration and the dispatch/response engine.

pub mod engine;
pub mod registry;

pub use engine::{
    CommandHandler, Dispatcher, Handler, HandlerKind, ALLOWED_WHEN_HALTED, UNLOCK_MCODE,
};
pub use registry::{HandlerId, HandlerRegistry};
