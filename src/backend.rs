use std::fmt;

use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};

use crate::model::{
    GuessLogEntry,
    Proximity,
};

/// Page size used when pulling the authoritative log history.
pub const DEFAULT_LOG_PAGE_SIZE: usize = 50;

/// Scoring result for a single submitted guess.
#[derive(Clone, Debug, PartialEq)]
pub struct GuessScore {
    pub similarity: f64,
    pub proximity: Proximity,
}

/// Surface of the scoring backend as seen by the orchestrator.
pub trait ScoringBackend {
    async fn submit_guess(
        &self,
        word: &str,
        wallet_address: &str,
    ) -> Result<GuessScore>;

    /// Authoritative guess history, newest-first.
    async fn fetch_logs(
        &self,
        cursor: Option<u64>,
        page_size: usize,
    ) -> Result<Vec<GuessLogEntry>>;
}

#[derive(Clone)]
pub struct HttpScoringClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpScoringClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for scoring backend")?;
        Ok(Self { base_url, http })
    }
}

impl ScoringBackend for HttpScoringClient {
    async fn submit_guess(
        &self,
        word: &str,
        wallet_address: &str,
    ) -> Result<GuessScore> {
        let url = format!("{}/guess", self.base_url);
        let res = self
            .http
            .post(url)
            .json(&SubmitGuessRequest {
                word,
                wallet_address,
            })
            .send()
            .await
            .wrap_err("scoring backend request failed")?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read scoring backend response body")?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(eyre!(
                "scoring backend responded with {status} when scoring a guess: {body}"
            ));
        }
        let dto: GuessScoreDto = serde_json::from_slice(&bytes)
            .wrap_err("invalid scoring backend payload")?;
        Ok(dto.into())
    }

    async fn fetch_logs(
        &self,
        cursor: Option<u64>,
        page_size: usize,
    ) -> Result<Vec<GuessLogEntry>> {
        let cursor = cursor.unwrap_or(0);
        let url = format!(
            "{}/logs?cursor={cursor}&pageSize={page_size}",
            self.base_url
        );
        let res = self
            .http
            .get(url)
            .send()
            .await
            .wrap_err("scoring backend request failed")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(eyre!(
                "scoring backend responded with {status} when fetching logs: {body}"
            ));
        }
        let dtos: Vec<LogEntryDto> = res
            .json()
            .await
            .wrap_err("invalid scoring backend log payload")?;
        Ok(dtos.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for HttpScoringClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitGuessRequest<'a> {
    word: &'a str,
    wallet_address: &'a str,
}

#[derive(Deserialize)]
struct GuessScoreDto {
    similarity: Option<f64>,
    proximity: Option<ProximityDto>,
}

#[derive(Deserialize)]
struct LogEntryDto {
    player: String,
    guess: String,
    similarity: Option<f64>,
    proximity: Option<ProximityDto>,
}

/// The backend has shipped proximity both as a rank number and as a
/// qualitative string; accept either shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProximityDto {
    Rank(u64),
    Text(String),
}

impl From<ProximityDto> for Proximity {
    fn from(value: ProximityDto) -> Self {
        match value {
            ProximityDto::Rank(rank) => Proximity::Rank(rank),
            ProximityDto::Text(text) => match text.trim().parse::<u64>() {
                Ok(rank) => Proximity::Rank(rank),
                Err(_) => Proximity::Far,
            },
        }
    }
}

/// Similarity is canonically a `[0, 1]` fraction. Values above 1 are taken to
/// be on the percentage scale and divided down; everything is clamped.
fn normalize_similarity(raw: f64) -> f64 {
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

impl From<GuessScoreDto> for GuessScore {
    fn from(dto: GuessScoreDto) -> Self {
        GuessScore {
            similarity: normalize_similarity(dto.similarity.unwrap_or(0.0)),
            proximity: dto.proximity.map(Into::into).unwrap_or_default(),
        }
    }
}

impl From<LogEntryDto> for GuessLogEntry {
    fn from(dto: LogEntryDto) -> Self {
        GuessLogEntry {
            player: dto.player,
            guess: dto.guess,
            similarity: normalize_similarity(dto.similarity.unwrap_or(0.0)),
            proximity: dto.proximity.map(Into::into).unwrap_or_default(),
            submitted_at: Utc::now(),
        }
    }
}
