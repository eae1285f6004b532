use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::auth::{AuthError, token_from_header};
use crate::state::AppState;
use ink_core::PLAYER_BEST_LIMIT;
use ink_types::{
    ErrorBody, LoginRequest, NewAttempt, Player, PracticeLevel, PredictRequest, PredictResponse,
    RecordAttemptRequest, RegisterRequest, round_to_tenth,
};

pub mod auth;
pub mod config;
pub mod predict;
pub mod recognition;
pub mod state;
pub mod websocket;

const MAX_LEADERBOARD_LIMIT: usize = 100;
const MAX_JSON_BODY_BYTES: u64 = 64 * 1024;

/// Oversized prediction bodies answer 500 like any other prediction failure.
#[derive(Debug)]
struct PredictPayloadTooLarge;

impl warp::reject::Reject for PredictPayloadTooLarge {}

#[derive(Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

impl LeaderboardQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(PLAYER_BEST_LIMIT)
            .min(MAX_LEADERBOARD_LIMIT)
    }
}

#[derive(Deserialize)]
struct PracticeQuery {
    level: Option<String>,
}

pub fn create_routes(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map({
        let state = state.clone();
        move || state.clone()
    });
    let bearer = warp::header::optional::<String>("authorization");

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(state_filter.clone())
        .map(|ws: warp::ws::Ws, state: AppState| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, state))
        });

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .map(|| json_reply(&serde_json::json!({ "ok": true }), StatusCode::OK));

    let predict_body = warp::body::content_length_limit(state.max_body_bytes)
        .and(warp::body::bytes())
        .or_else(|rejection: warp::Rejection| async move {
            let rejection = if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
                warp::reject::custom(PredictPayloadTooLarge)
            } else {
                rejection
            };
            Err::<(Bytes,), _>(rejection)
        });

    let predict = warp::path!("api" / "predict")
        .and(warp::post())
        .and(predict_body)
        .and(state_filter.clone())
        .and_then(handle_predict_request);

    // Accounts
    let register = warp::path!("api" / "auth" / "register")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_JSON_BODY_BYTES))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_register_request);

    let login = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_JSON_BODY_BYTES))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_login_request);

    let logout = warp::path!("api" / "auth" / "logout")
        .and(warp::post())
        .and(bearer.clone())
        .and(state_filter.clone())
        .and_then(handle_logout_request);

    let session = warp::path!("api" / "auth" / "session")
        .and(warp::get())
        .and(bearer.clone())
        .and(state_filter.clone())
        .and_then(handle_session_request);

    // Leaderboards
    let global_leaderboard = warp::path!("api" / "leaderboard" / "global")
        .and(warp::get())
        .and(warp::query::<LeaderboardQuery>())
        .and(state_filter.clone())
        .and_then(handle_global_leaderboard_request);

    let friends_leaderboard = warp::path!("api" / "leaderboard" / "friends")
        .and(warp::get())
        .and(warp::query::<LeaderboardQuery>())
        .and(state_filter.clone())
        .and_then(handle_friends_leaderboard_request);

    let word_leaderboard = warp::path!("api" / "leaderboard" / "words")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(handle_word_leaderboard_request);

    let player_summary = warp::path!("api" / "players" / String / "summary")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(handle_player_summary_request);

    let list_attempts = warp::path!("api" / "attempts")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(handle_list_attempts_request);

    let record_attempt = warp::path!("api" / "attempts")
        .and(warp::post())
        .and(bearer.clone())
        .and(warp::body::content_length_limit(MAX_JSON_BODY_BYTES))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_record_attempt_request);

    // Words
    let next_word = warp::path!("api" / "words" / "next")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(handle_next_word_request);

    let practice_words = warp::path!("api" / "words" / "practice")
        .and(warp::get())
        .and(warp::query::<PracticeQuery>())
        .and(state_filter.clone())
        .and_then(handle_practice_words_request);

    let definition = warp::path!("api" / "words" / String / "definition")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(handle_definition_request);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    let accounts = register.or(login).or(logout).or(session);
    let leaderboards = global_leaderboard
        .or(friends_leaderboard)
        .or(word_leaderboard)
        .or(player_summary)
        .or(list_attempts)
        .or(record_attempt);
    let words = next_word.or(practice_words).or(definition);

    websocket
        .or(health)
        .or(predict)
        .or(accounts)
        .or(leaderboards)
        .or(words)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log("ink"))
}

/// Every JSON reply is marked uncacheable.
fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    let reply = warp::reply::with_status(warp::reply::json(body), status);
    warp::reply::with_header(reply, "cache-control", "no-store").into_response()
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    json_reply(&ErrorBody::new(message), status)
}

fn auth_error_reply(error: AuthError) -> Response {
    let status = match &error {
        AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Signing(_) | AuthError::Hashing(_) | AuthError::Storage(_) => {
            tracing::error!("Account operation failed: {}", error);
            return error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Account service unavailable");
        }
    };
    error_reply(status, error.to_string())
}

fn require_player(auth_header: Option<&str>, state: &AppState) -> Result<(String, Player), Response> {
    let token = auth_header
        .and_then(token_from_header)
        .ok_or_else(|| error_reply(StatusCode::UNAUTHORIZED, "Authentication required"))?;

    state
        .auth
        .validate_token(token)
        .map(|player| (token.to_string(), player))
        .map_err(auth_error_reply)
}

async fn handle_rejection(err: warp::Rejection) -> Result<Response, Infallible> {
    if err.find::<PredictPayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Payload too large"));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large"));
    }
    if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)));
    }
    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(error_reply(StatusCode::LENGTH_REQUIRED, "Content-Length required"));
    }
    Ok(error_reply(StatusCode::NOT_FOUND, "Not found"))
}

async fn handle_predict_request(body: Bytes, state: AppState) -> Result<Response, warp::Rejection> {
    let request: PredictRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PredictRequest {
            image_data_url: None,
            target_word: None,
        }
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return Ok(error_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Invalid JSON body: {}", e),
                ));
            }
        }
    };

    if let Some(target) = request.target_word.as_deref() {
        tracing::debug!("Predicting snapshot for target '{}'", target);
    }

    match state.predictor.predict(request.image_data_url.as_deref()).await {
        Ok(predicted_word) => Ok(json_reply(
            &PredictResponse { predicted_word },
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn handle_register_request(
    request: RegisterRequest,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    match state.auth.register(&request).await {
        Ok(session) => Ok(json_reply(&session, StatusCode::CREATED)),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

async fn handle_login_request(
    request: LoginRequest,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    match state.auth.login(&request).await {
        Ok(session) => Ok(json_reply(&session, StatusCode::OK)),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

async fn handle_logout_request(
    auth_header: Option<String>,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    let (token, player) = match require_player(auth_header.as_deref(), &state) {
        Ok(authenticated) => authenticated,
        Err(reply) => return Ok(reply),
    };

    state.auth.logout(&token);
    let sockets = state.connections.revoke_token(&token).await;
    tracing::debug!("Signed {} out of {} sockets", player.username, sockets);
    Ok(json_reply(&serde_json::json!({ "ok": true }), StatusCode::OK))
}

async fn handle_session_request(
    auth_header: Option<String>,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    let token = match auth_header.as_deref().and_then(token_from_header) {
        Some(token) => token,
        None => return Ok(error_reply(StatusCode::UNAUTHORIZED, "Authentication required")),
    };

    match state.auth.session(token) {
        Ok(session) => Ok(json_reply(&session, StatusCode::OK)),
        Err(e) => Ok(auth_error_reply(e)),
    }
}

async fn handle_global_leaderboard_request(
    query: LeaderboardQuery,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    match state.ranking.top_by_time(None, query.limit()).await {
        Ok(rows) => Ok(json_reply(&rows, StatusCode::OK)),
        Err(err) => {
            tracing::error!("Failed to fetch leaderboard: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch leaderboard",
            ))
        }
    }
}

async fn handle_friends_leaderboard_request(
    query: LeaderboardQuery,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    match state.ranking.top_in_group(&state.friends, query.limit()).await {
        Ok(rows) => Ok(json_reply(&rows, StatusCode::OK)),
        Err(err) => {
            tracing::error!("Failed to fetch friends leaderboard: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch leaderboard",
            ))
        }
    }
}

async fn handle_word_leaderboard_request(state: AppState) -> Result<Response, warp::Rejection> {
    match state.ranking.best_per_word().await {
        Ok(rows) => Ok(json_reply(&rows, StatusCode::OK)),
        Err(err) => {
            tracing::error!("Failed to fetch word leaderboard: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch leaderboard",
            ))
        }
    }
}

async fn handle_player_summary_request(
    player: String,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    match state.ranking.player_summary(&player).await {
        Ok(summary) => Ok(json_reply(&summary, StatusCode::OK)),
        Err(err) => {
            tracing::error!("Failed to summarize {}: {}", player, err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch player summary",
            ))
        }
    }
}

async fn handle_list_attempts_request(state: AppState) -> Result<Response, warp::Rejection> {
    match state.ranking.attempts().await {
        Ok(attempts) => Ok(json_reply(&attempts, StatusCode::OK)),
        Err(err) => {
            tracing::error!("Failed to load attempts: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load attempts",
            ))
        }
    }
}

async fn handle_record_attempt_request(
    auth_header: Option<String>,
    request: RecordAttemptRequest,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    let (_, player) = match require_player(auth_header.as_deref(), &state) {
        Ok(authenticated) => authenticated,
        Err(reply) => return Ok(reply),
    };

    let word = request.word.trim();
    if word.is_empty() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "word is required"));
    }
    if !request.time_seconds.is_finite() || request.time_seconds < 0.0 {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "timeSeconds must be a non-negative number",
        ));
    }

    let record = NewAttempt::new(
        player.username,
        word.to_lowercase(),
        request.is_correct,
        round_to_tenth(request.time_seconds),
    );
    match state.ranking.add_attempt(record).await {
        Ok(attempt) => Ok(json_reply(&attempt, StatusCode::CREATED)),
        Err(err) => {
            tracing::error!("Failed to record attempt: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to record attempt",
            ))
        }
    }
}

async fn handle_next_word_request(state: AppState) -> Result<Response, warp::Rejection> {
    match state.words.next_word().await {
        Ok(word) => Ok(json_reply(&word, StatusCode::OK)),
        Err(err) => Ok(error_reply(StatusCode::BAD_GATEWAY, err.to_string())),
    }
}

async fn handle_practice_words_request(
    query: PracticeQuery,
    state: AppState,
) -> Result<Response, warp::Rejection> {
    let level = PracticeLevel::from_name(query.level.as_deref().unwrap_or("easy"));
    match state.words.practice_words(&level).await {
        Ok(words) => Ok(json_reply(&words, StatusCode::OK)),
        Err(err) => Ok(error_reply(StatusCode::BAD_GATEWAY, err.to_string())),
    }
}

async fn handle_definition_request(word: String, state: AppState) -> Result<Response, warp::Rejection> {
    match state.words.definition(&word).await {
        Ok(definition) => Ok(json_reply(&definition, StatusCode::OK)),
        Err(err) => Ok(error_reply(StatusCode::BAD_GATEWAY, err.to_string())),
    }
}
