//! Event infrastructure — native broadcast translation.
//!
//! `translation` is the pure broadcast → channel payload mapping;
//! `translator` runs it against the platform's broadcast source.

pub mod translation;
pub mod translator;

pub use translation::{translate_broadcast, TranslationError};
pub use translator::{BroadcastTranslator, TranslatorHandle};
