pub mod attempt_repository;
pub mod player_repository;

pub use attempt_repository::{AttemptRepository, StoredAttempt, demo_attempts, resolve_is_correct};
pub use player_repository::{PlayerRecord, PlayerRepository};
