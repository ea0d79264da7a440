pub mod api;
pub mod models;

/// Stored as `audio_url` when a memo is created without an audio file.
pub const PLACEHOLDER_AUDIO_URL: &str = "https://placeholder.com/audio.m4a";
