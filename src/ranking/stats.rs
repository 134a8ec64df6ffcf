use serde::Serialize;
use thiserror::Error;
use crate::document::AttendanceDocument;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankingError {
    #[error("player '{0}' not found")]
    PlayerNotFound(String),
}

/// Header line for one training: "going / roster size"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event: String,
    pub going: usize, // waitlisted players included
    pub players: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub name: String,
    pub going: usize,
    pub total_events: usize,
    pub percent: f64,
}

pub fn event_summaries(document: &AttendanceDocument) -> Vec<EventSummary> {
    let players = document.players.len();
    document
        .events
        .iter()
        .map(|event| EventSummary {
            event: event.clone(),
            going: document.players.iter().filter(|p| p.is_going(event)).count(),
            players,
        })
        .collect()
}

/// Share of known trainings a player has signed up for, waitlisted or not.
pub fn player_stats(document: &AttendanceDocument, name: &str) -> Result<PlayerStats, RankingError> {
    let player = document
        .player(name)
        .ok_or_else(|| RankingError::PlayerNotFound(name.to_string()))?;

    let total_events = document.events.len();
    let going = document.events.iter().filter(|e| player.is_going(e)).count();
    let percent = if total_events == 0 {
        0.0
    } else {
        (going as f64 / total_events as f64 * 1000.0).round() / 10.0
    };

    Ok(PlayerStats {
        name: player.name.clone(),
        going,
        total_events,
        percent,
    })
}
