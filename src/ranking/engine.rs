use serde::Serialize;
use crate::document::AttendanceDocument;

/// Number of sign-ups confirmed per training unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 20;

/// A going player as seen by the ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRef<'a> {
    pub name: &'a str,
    #[serde(rename = "joinTs")]
    pub join_ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistEntry<'a> {
    #[serde(flatten)]
    pub player: PlayerRef<'a>,
    pub position: usize, // 1-based
}

/// Confirmed list and waitlist for one training
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking<'a> {
    pub event: &'a str,
    pub capacity: usize,
    pub confirmed: Vec<PlayerRef<'a>>,
    pub waitlist: Vec<WaitlistEntry<'a>>,
    /// Everyone who wants to go, before the capacity cutoff.
    pub total_going: usize,
}

/// What a single roster cell shows for a player and a training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SignupStatus {
    NotGoing,
    Confirmed,
    Waitlisted { position: usize },
}

impl<'a> Ranking<'a> {
    pub fn status_of(&self, player_name: &str) -> SignupStatus {
        if self.confirmed.iter().any(|p| p.name == player_name) {
            return SignupStatus::Confirmed;
        }
        self.waitlist
            .iter()
            .find(|w| w.player.name == player_name)
            .map(|w| SignupStatus::Waitlisted { position: w.position })
            .unwrap_or(SignupStatus::NotGoing)
    }
}

/// Derives who is confirmed and who is waitlisted for an event.
///
/// Going players are ordered by `joinTs` ascending with an absent timestamp
/// first. The sort is stable, so equal keys keep roster order. Rank is never
/// stored anywhere; call this on every read.
pub fn compute_ranking<'a>(
    document: &'a AttendanceDocument,
    event_key: &'a str,
    capacity: usize,
) -> Ranking<'a> {
    let mut going: Vec<PlayerRef<'a>> = document
        .players
        .iter()
        .filter_map(|p| {
            p.attendance_for(event_key)
                .filter(|a| a.is_going())
                .map(|a| PlayerRef { name: p.name.as_str(), join_ts: a.join_ts })
        })
        .collect();

    // Option<i64> orders None before any Some
    going.sort_by_key(|p| p.join_ts);

    let total_going = going.len();
    let split = capacity.min(total_going);
    let overflow = going.split_off(split);

    let waitlist = overflow
        .into_iter()
        .enumerate()
        .map(|(i, player)| WaitlistEntry { player, position: i + 1 })
        .collect();

    Ranking {
        event: event_key,
        capacity,
        confirmed: going,
        waitlist,
        total_going,
    }
}

/// Rankings for every event, in the document's event order.
pub fn rank_all_events(document: &AttendanceDocument, capacity: usize) -> Vec<Ranking<'_>> {
    document
        .events
        .iter()
        .map(|event| compute_ranking(document, event.as_str(), capacity))
        .collect()
}
