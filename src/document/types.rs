use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

/// Fields a client sent that this crate does not interpret; kept so a
/// submitted document is stored exactly as received.
pub type ExtraFields = Map<String, Value>;

/// Sign-up status of one player for one training.
///
/// The wire tokens are Czech (`jdu` = going, `nejdu` = not going) and are
/// relied upon by existing clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "jdu")]
    Going,
    #[default]
    #[serde(rename = "nejdu")]
    NotGoing,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Going => "jdu",
            Status::NotGoing => "nejdu",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jdu" | "going" => Ok(Status::Going),
            "nejdu" | "not_going" | "not-going" => Ok(Status::NotGoing),
            other => Err(format!("unknown status '{}', expected jdu or nejdu", other)),
        }
    }
}

/// Attendance of a player for a single training
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub status: Status,
    /// Milliseconds since the Unix epoch at which the status last became `Going`.
    #[serde(rename = "joinTs", default)]
    pub join_ts: Option<i64>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Attendance {
    /// Going stamps `joinTs` with `now_ms`, not going clears it.
    pub fn set_status(&mut self, status: Status, now_ms: i64) {
        self.status = status;
        self.join_ts = match status {
            Status::Going => Some(now_ms),
            Status::NotGoing => None,
        };
    }

    pub fn is_going(&self) -> bool {
        self.status == Status::Going
    }
}

#[cfg(test)]
impl Attendance {
    pub fn going(join_ts: i64) -> Self {
        Self { status: Status::Going, join_ts: Some(join_ts), extra: ExtraFields::new() }
    }

    pub fn not_going() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub attendance: BTreeMap<String, Attendance>, // event key -> attendance
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attendance: BTreeMap::new(), extra: ExtraFields::new() }
    }

    /// Attendance for an event; a missing entry means "not going".
    pub fn attendance_for(&self, event_key: &str) -> Option<&Attendance> {
        self.attendance.get(event_key)
    }

    pub fn is_going(&self, event_key: &str) -> bool {
        self.attendance_for(event_key).map(Attendance::is_going).unwrap_or(false)
    }
}

/// The whole shared state: events in insertion order plus the roster.
///
/// This is the unit of persistence and of transfer; it is always replaced
/// as a whole, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDocument {
    #[serde(rename = "trainingDates", default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl AttendanceDocument {
    pub fn has_event(&self, event_key: &str) -> bool {
        self.events.iter().any(|e| e == event_key)
    }

    /// Case-sensitive exact lookup by stored name.
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn player_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.name == name)
    }

    /// Case-insensitive lookup, used for roster uniqueness.
    pub fn has_player_named(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.players.iter().any(|p| p.name.to_lowercase() == lower)
    }
}
