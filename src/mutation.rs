//! Attendance toggles and roster/event additions.
//!
//! Every operation reads the caller's copy of the document and returns a new
//! one, or fails and leaves the input untouched. Nothing here persists or
//! broadcasts; the result is meant to be submitted through
//! [`SyncBroadcaster::replace_document`](crate::sync::SyncBroadcaster::replace_document).

use chrono::Utc;
use thiserror::Error;
use crate::document::{AttendanceDocument, Player, Status};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("player '{0}' not found")]
    NotFound(String),
    #[error("training '{0}' is not in the list of trainings")]
    UnknownEvent(String),
    #[error("a player named '{0}' already exists")]
    DuplicateName(String),
    #[error("training '{0}' already exists")]
    DuplicateEvent(String),
    #[error("player name must not be empty")]
    EmptyName,
    #[error("training key must not be empty")]
    EmptyEventKey,
}

/// A single intended change to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetAttendance { event: String, player: String, status: Status },
    AddPlayer { name: String },
    AddEvent { event: String },
}

impl Mutation {
    pub fn apply(&self, document: &AttendanceDocument) -> Result<AttendanceDocument, MutationError> {
        match self {
            Mutation::SetAttendance { event, player, status } => set_attendance(document, event, player, *status),
            Mutation::AddPlayer { name } => add_player(document, name),
            Mutation::AddEvent { event } => add_event(document, event),
        }
    }
}

/// Sets a player's status for a training, stamping the sign-up time now.
pub fn set_attendance(
    document: &AttendanceDocument,
    event_key: &str,
    player_name: &str,
    status: Status,
) -> Result<AttendanceDocument, MutationError> {
    set_attendance_at(document, event_key, player_name, status, Utc::now().timestamp_millis())
}

/// Like [`set_attendance`] with an explicit instant in epoch milliseconds.
///
/// Going sets `joinTs` to `now_ms`, not going clears it. Re-selecting going
/// restamps, which moves the player to the back of the queue.
pub fn set_attendance_at(
    document: &AttendanceDocument,
    event_key: &str,
    player_name: &str,
    status: Status,
    now_ms: i64,
) -> Result<AttendanceDocument, MutationError> {
    if !document.has_event(event_key) {
        return Err(MutationError::UnknownEvent(event_key.to_string()));
    }
    if document.player(player_name).is_none() {
        return Err(MutationError::NotFound(player_name.to_string()));
    }

    let mut next = document.clone();
    let player = next
        .player_mut(player_name)
        .ok_or_else(|| MutationError::NotFound(player_name.to_string()))?;

    player
        .attendance
        .entry(event_key.to_string())
        .or_default()
        .set_status(status, now_ms);

    Ok(next)
}

/// Appends a player with no attendance. Names are unique ignoring case.
pub fn add_player(document: &AttendanceDocument, name: &str) -> Result<AttendanceDocument, MutationError> {
    if name.trim().is_empty() {
        return Err(MutationError::EmptyName);
    }
    if document.has_player_named(name) {
        return Err(MutationError::DuplicateName(name.to_string()));
    }

    let mut next = document.clone();
    next.players.push(Player::new(name));
    Ok(next)
}

/// Appends a training key. Keys are compared byte for byte and never
/// reordered; existing players get no attendance entry for it.
pub fn add_event(document: &AttendanceDocument, event_key: &str) -> Result<AttendanceDocument, MutationError> {
    if event_key.trim().is_empty() {
        return Err(MutationError::EmptyEventKey);
    }
    if document.has_event(event_key) {
        return Err(MutationError::DuplicateEvent(event_key.to_string()));
    }

    let mut next = document.clone();
    next.events.push(event_key.to_string());
    Ok(next)
}
