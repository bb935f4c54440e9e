//! Thin typed clients for the hosted HTTP collaborators.
//!
//! Both are black boxes to the session: send a well-formed request, accept
//! any well-formed response, and surface failures as typed errors — never
//! crash the session.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};
use crate::types::{Facility, FacilitySearchQuery};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client")
    })
}

fn status_to_error(status: u16, body: &str) -> VoiceError {
    match status {
        401 | 403 => VoiceError::AuthInvalid(body.to_string()),
        404 => VoiceError::AgentNotFound(body.to_string()),
        429 => VoiceError::QuotaExceeded(body.to_string()),
        _ => VoiceError::Network(format!("backend returned status {status}: {body}")),
    }
}

/// Facility search response: a list of records plus a summary string.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilitySearchResponse {
    #[serde(default)]
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl FacilitySearchResponse {
    /// The summary to display, synthesized from the total when the backend
    /// omits one.
    pub fn display_summary(&self) -> String {
        self.summary.clone().unwrap_or_else(|| {
            format!(
                "Found {} facilities matching your criteria",
                self.total.unwrap_or(self.facilities.len() as u32),
            )
        })
    }
}

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    #[serde(rename = "searchParams")]
    search_params: &'a FacilitySearchQuery,
}

/// Client for the facility search backend.
#[derive(Debug, Clone)]
pub struct FacilityClient {
    base_url: String,
    api_key: String,
}

impl FacilityClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Search facilities matching the query.
    pub async fn search(&self, query: &FacilitySearchQuery) -> Result<FacilitySearchResponse> {
        let response = shared_client()
            .post(format!("{}/search-facilities", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SearchRequestBody {
                search_params: query,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpeechResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Client for the text-to-speech backend.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    base_url: String,
    api_key: String,
}

impl SpeechClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Synthesize speech for `text`, returning decoded audio bytes.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let response = shared_client()
            .post(format!("{}/text-to-speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text, "voice": voice }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body));
        }

        let body: SpeechResponse = serde_json::from_str(&response.text().await?)?;
        BASE64
            .decode(&body.audio_content)
            .map_err(|err| VoiceError::Playback(format!("invalid audio payload: {err}")))
    }
}
