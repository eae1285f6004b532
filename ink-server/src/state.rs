use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ink_core::{
    Judge, LiveFeed, PlayerGroup, RankingEngine, RecognitionService, RoundConfig, WordBank,
    WordSource,
};
use ink_persistence::DatabaseManager;
use ink_types::JudgeStrategy;
use tracing::info;

use crate::auth::AuthService;
use crate::config::Config;
use crate::predict::ScriptPredictor;
use crate::recognition::HttpRecognizer;
use crate::websocket::ConnectionManager;

/// Everything the routes and sockets share.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub connections: Arc<ConnectionManager>,
    pub ranking: Arc<RankingEngine>,
    pub words: Arc<dyn WordSource>,
    pub predictor: Arc<ScriptPredictor>,
    pub judge: Judge,
    pub round_config: RoundConfig,
    pub live_feed: LiveFeed,
    pub friends: Arc<PlayerGroup>,
    pub ws_max_messages: u32,
    pub ws_refill: Duration,
    pub max_body_bytes: u64,
}

impl AppState {
    pub fn from_config(config: &Config, db: &DatabaseManager) -> anyhow::Result<Self> {
        let predictor = Arc::new(ScriptPredictor::new(
            &config.python_bin,
            &config.predict_script,
            config.predict_timeout,
        ));
        let judge = build_judge(config, predictor.clone())?;

        Ok(Self {
            auth: Arc::new(AuthService::new(
                Arc::new(db.players()),
                &config.session_secret,
                config.session_ttl,
            )),
            connections: Arc::new(ConnectionManager::new()),
            ranking: Arc::new(RankingEngine::new(Arc::new(db.attempts()))),
            words: Arc::new(load_words(config)?),
            predictor,
            judge,
            round_config: RoundConfig::default(),
            live_feed: LiveFeed::new(config.live_feed_interval),
            friends: Arc::new(PlayerGroup::new("friends", config.friends.clone())),
            ws_max_messages: config.ws_max_messages,
            ws_refill: config.ws_refill,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// The built-in bank, or one whose random pool comes from `WORD_LIST`.
pub fn load_words(config: &Config) -> anyhow::Result<WordBank> {
    let Some(path) = &config.word_list else {
        return Ok(WordBank::new());
    };
    let word_list = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read word list {}", path.display()))?;
    let bank = WordBank::from_word_list(&word_list);
    if bank.pool_size() == 0 {
        anyhow::bail!("word list {} has no usable words", path.display());
    }
    info!("Loaded {} words from {}", bank.pool_size(), path.display());
    Ok(bank)
}

/// Image rounds go to the remote recognizer when one is configured, and to
/// the local prediction script otherwise.
pub fn build_judge(config: &Config, predictor: Arc<ScriptPredictor>) -> anyhow::Result<Judge> {
    match config.judge_strategy {
        JudgeStrategy::TextCompare => Ok(Judge::text_compare()),
        JudgeStrategy::ImageRecognition => {
            let (recognizer, timeout): (Arc<dyn RecognitionService>, Duration) =
                match &config.recognition_url {
                    Some(url) => (
                        Arc::new(
                            HttpRecognizer::new(url.clone(), config.recognition_timeout)
                                .context("invalid recognition service")?,
                        ),
                        config.recognition_timeout,
                    ),
                    None => (predictor, config.predict_timeout),
                };
            Ok(Judge::image_recognition(recognizer).with_timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_follows_strategy() {
        let predictor = Arc::new(ScriptPredictor::new(
            "/bin/true",
            "predict.py",
            Duration::from_secs(120),
        ));

        let mut config = Config::default();
        let judge = build_judge(&config, predictor.clone()).unwrap();
        assert_eq!(judge.strategy(), JudgeStrategy::ImageRecognition);
        assert_eq!(judge.timeout(), Duration::from_secs(120));

        config.recognition_url = Some("http://127.0.0.1:9/api/predict".to_string());
        let judge = build_judge(&config, predictor.clone()).unwrap();
        assert_eq!(judge.timeout(), Duration::from_secs(30));

        config.judge_strategy = JudgeStrategy::TextCompare;
        let judge = build_judge(&config, predictor).unwrap();
        assert_eq!(judge.strategy(), JudgeStrategy::TextCompare);
    }

    #[tokio::test]
    async fn test_word_list_replaces_random_pool() {
        let path = std::env::temp_dir().join(format!("ink-words-{}.txt", uuid::Uuid::new_v4().simple()));
        std::fs::write(&path, "# solar
Comet
").unwrap();

        let config = Config {
            word_list: Some(path.clone()),
            ..Config::default()
        };
        let words = load_words(&config).unwrap();
        assert_eq!(words.next_word().await.unwrap().word, "comet");

        std::fs::write(&path, "# nothing usable
42
").unwrap();
        let err = load_words(&config).unwrap_err();
        assert!(err.to_string().contains("no usable words"));

        std::fs::remove_file(&path).unwrap();
        assert!(load_words(&config).is_err());
        assert_eq!(load_words(&Config::default()).unwrap().pool_size(), 7);
    }
}
