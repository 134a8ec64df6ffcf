use std::fs::File;
use std::io::Write;
use crate::document::AttendanceDocument;
use crate::ranking::{player_stats, rank_all_events, Ranking, SignupStatus};

/// Splits an event key like "2025-02-03 19:30" into its date and time parts
/// for display. Keys without a space are shown whole with no time.
pub fn split_event_key(event_key: &str) -> (&str, Option<&str>) {
    match event_key.split_once(' ') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (event_key, None),
    }
}

fn describe_status(status: SignupStatus) -> String {
    match status {
        SignupStatus::Confirmed => "going".to_string(),
        SignupStatus::Waitlisted { position } => format!("waitlist {}", position),
        SignupStatus::NotGoing => "not going".to_string(),
    }
}

fn format_timestamp(join_ts: Option<i64>) -> String {
    join_ts
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Renders one training's roster: header, confirmed players, waitlist.
pub fn render_ranking(ranking: &Ranking<'_>, roster_size: usize) -> String {
    let mut out = String::new();
    let (date, time) = split_event_key(ranking.event);
    match time {
        Some(time) => out.push_str(&format!("** {} {} **\n", date, time)),
        None => out.push_str(&format!("** {} **\n", date)),
    }
    out.push_str(&format!(
        "Going: {}/{} (capacity {})\n",
        ranking.total_going, roster_size, ranking.capacity
    ));

    for (i, player) in ranking.confirmed.iter().enumerate() {
        out.push_str(&format!("  {:>2}. {} (signed up {})\n", i + 1, player.name, format_timestamp(player.join_ts)));
    }
    if ranking.confirmed.is_empty() {
        out.push_str("  [NOBODY]\n");
    }

    if !ranking.waitlist.is_empty() {
        out.push_str("Waitlist:\n");
        for entry in &ranking.waitlist {
            out.push_str(&format!(
                "  {:>2}. {} (signed up {})\n",
                entry.position,
                entry.player.name,
                format_timestamp(entry.player.join_ts)
            ));
        }
    }
    out
}

pub fn render_document(document: &AttendanceDocument, capacity: usize) -> String {
    let mut out = String::new();
    let rankings = rank_all_events(document, capacity);
    for ranking in &rankings {
        out.push_str(&render_ranking(ranking, document.players.len()));
        out.push('\n');
    }

    if !document.players.is_empty() {
        out.push_str("== Players ==\n");
        for player in &document.players {
            if let Ok(stats) = player_stats(document, &player.name) {
                out.push_str(&format!(
                    "  {} is going to {} of {} trainings ({:.1}%)\n",
                    stats.name, stats.going, stats.total_events, stats.percent
                ));
            }
            for ranking in &rankings {
                out.push_str(&format!(
                    "      {}: {}\n",
                    ranking.event,
                    describe_status(ranking.status_of(&player.name))
                ));
            }
        }
    }
    out
}

/// Prints every training's roster followed by per-player statistics
pub fn print_document(document: &AttendanceDocument, capacity: usize) {
    if document.events.is_empty() {
        println!("No trainings scheduled.");
    }
    print!("{}", render_document(document, capacity));
}

pub fn write_document_to_file(
    document: &AttendanceDocument,
    capacity: usize,
    filename: &str,
) -> Result<(), std::io::Error> {
    let mut file = File::create(filename)?;
    file.write_all(render_document(document, capacity).as_bytes())?;
    Ok(())
}
