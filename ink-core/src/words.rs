use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ink_types::{NextWord, PracticeLevel, PracticeWords, WordDefinition};
use rand::Rng;

/// Where target words and definitions come from. Every call may fail, and
/// callers surface failures instead of retrying.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn next_word(&self) -> Result<NextWord>;
    async fn practice_words(&self, level: &PracticeLevel) -> Result<PracticeWords>;
    async fn definition(&self, word: &str) -> Result<WordDefinition>;
}

const RANDOM_POOL: &[&str] = &["planet", "orbit", "echo", "velocity", "glide", "nova", "flux"];
const EASY: &[&str] = &["cat", "dog", "sun"];
const MEDIUM: &[&str] = &["planet", "window", "garden"];
const HARD: &[&str] = &["velocity", "synchronize", "trajectory"];

/// In-process word source with a random pool and three practice sets.
#[derive(Debug, Clone)]
pub struct WordBank {
    random_pool: Vec<String>,
    easy: Vec<String>,
    medium: Vec<String>,
    hard: Vec<String>,
}

impl WordBank {
    pub fn new() -> Self {
        Self {
            random_pool: owned(RANDOM_POOL),
            easy: owned(EASY),
            medium: owned(MEDIUM),
            hard: owned(HARD),
        }
    }

    /// Replaces the random pool with a newline separated word list. Blank
    /// lines, `#` comments and non-alphabetic entries are skipped.
    pub fn from_word_list(word_list: &str) -> Self {
        Self {
            random_pool: parse_word_list(word_list),
            ..Self::new()
        }
    }

    pub fn random_word(&self) -> Result<String> {
        pick(&self.random_pool).ok_or_else(|| anyhow!("No words available"))
    }

    pub fn practice_set(&self, level: &PracticeLevel) -> Vec<String> {
        match level {
            PracticeLevel::Easy => self.easy.clone(),
            PracticeLevel::Medium => self.medium.clone(),
            PracticeLevel::Hard => self.hard.clone(),
            PracticeLevel::Custom { words } => {
                words.iter().filter_map(|w| normalize_entry(w)).collect()
            }
        }
    }

    pub fn pool_size(&self) -> usize {
        self.random_pool.len()
    }
}

impl Default for WordBank {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WordSource for WordBank {
    async fn next_word(&self) -> Result<NextWord> {
        Ok(NextWord {
            word: self.random_word()?,
        })
    }

    async fn practice_words(&self, level: &PracticeLevel) -> Result<PracticeWords> {
        Ok(PracticeWords {
            level: level.name().to_string(),
            words: self.practice_set(level),
        })
    }

    async fn definition(&self, word: &str) -> Result<WordDefinition> {
        let word = word.trim();
        if word.is_empty() {
            return Err(anyhow!("word is required"));
        }
        Ok(WordDefinition {
            word: word.to_string(),
            definition: format!("{word} (mock): sample dictionary definition for practice mode."),
        })
    }
}

/// Uniformly picks one word, or `None` when the list is empty.
pub fn pick(words: &[String]) -> Option<String> {
    if words.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..words.len());
    words.get(index).cloned()
}

fn parse_word_list(word_list: &str) -> Vec<String> {
    word_list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(normalize_entry)
        .collect()
}

fn normalize_entry(word: &str) -> Option<String> {
    let word = word.trim().to_lowercase();
    (!word.is_empty() && word.chars().all(char::is_alphabetic)).then_some(word)
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_word_comes_from_pool() {
        let bank = WordBank::new();
        for _ in 0..20 {
            let word = bank.random_word().unwrap();
            assert!(RANDOM_POOL.contains(&word.as_str()));
        }
    }

    #[test]
    fn test_word_list_parsing() {
        let bank = WordBank::from_word_list("# comment\nPlanet\n\n  orbit  \nnot-a-word\nx1\n");
        assert_eq!(bank.pool_size(), 2);
        for _ in 0..20 {
            let word = bank.random_word().unwrap();
            assert!(word == "planet" || word == "orbit");
        }
    }

    #[test]
    fn test_empty_pool_fails() {
        let bank = WordBank::from_word_list("# nothing here\n");
        let result = bank.random_word();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No words available"));
    }

    #[tokio::test]
    async fn test_practice_levels() {
        let bank = WordBank::new();

        let medium = bank.practice_words(&PracticeLevel::Medium).await.unwrap();
        assert_eq!(medium.level, "medium");
        assert_eq!(medium.words, vec!["planet", "window", "garden"]);

        let fallback = bank
            .practice_words(&PracticeLevel::from_name("impossible"))
            .await
            .unwrap();
        assert_eq!(fallback.level, "easy");
        assert_eq!(fallback.words, vec!["cat", "dog", "sun"]);
    }

    #[tokio::test]
    async fn test_custom_practice_list() {
        let bank = WordBank::new();
        let level = PracticeLevel::Custom {
            words: vec!["Zebra".to_string(), "  ".to_string(), "quartz".to_string()],
        };

        let custom = bank.practice_words(&level).await.unwrap();
        assert_eq!(custom.level, "custom");
        assert_eq!(custom.words, vec!["zebra", "quartz"]);
    }

    #[tokio::test]
    async fn test_definition_text() {
        let bank = WordBank::new();
        let definition = bank.definition("orbit").await.unwrap();
        assert_eq!(
            definition.definition,
            "orbit (mock): sample dictionary definition for practice mode."
        );
        assert!(bank.definition("   ").await.is_err());
    }
}
