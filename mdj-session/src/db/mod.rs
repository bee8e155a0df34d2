//! Database access layer
//!
//! Two SQLite tiers: `state.db` holds the key-value metadata snapshot and
//! closed session records; `audio.db` holds binary audio content. The audio
//! tier can fail independently without taking metadata persistence down.

pub mod audio;
pub mod init;
pub mod metadata;
