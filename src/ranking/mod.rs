pub mod engine;
pub mod stats;

pub use engine::{rank_all_events, Ranking, SignupStatus, DEFAULT_CAPACITY};
pub use stats::{event_summaries, player_stats, RankingError};
