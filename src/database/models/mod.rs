// Database models

mod chat;
mod client;
mod persona;
mod transcription;

pub use chat::{ChatMessage, ChatRole};
pub use client::Client;
pub use persona::PersonaProfile;
pub use transcription::{Segment, Transcription, TranscriptionStatus};
