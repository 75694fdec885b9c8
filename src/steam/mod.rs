use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::{LifecycleError, Result};

const PUBLISHED_FILE_DETAILS_URL: &str =
    "https://api.steampowered.com/ISteamRemoteStorage/GetPublishedFileDetails/v1/";

/// Steam's per-item result code for a successful lookup.
const RESULT_OK: u32 = 1;

#[derive(Debug, Clone)]
pub struct WorkshopItem {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Workshop metadata lookup.
///
/// Implementations must distinguish an item Steam reports as missing
/// (`LifecycleError::ItemUnavailable`) from transport or parse failures.
#[async_trait]
pub trait SteamWorkshop: Send + Sync {
    async fn get_mod_info(&self, external_id: &str) -> Result<WorkshopItem>;
}

/// Client for the published-file-details endpoint of the Steam Web API.
pub struct SteamApiClient {
    http: reqwest::Client,
}

impl SteamApiClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    response: DetailsEnvelope,
}

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    #[serde(default)]
    publishedfiledetails: Vec<FileDetail>,
}

#[derive(Debug, Deserialize)]
struct FileDetail {
    result: u32,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    time_updated: i64,
}

#[async_trait]
impl SteamWorkshop for SteamApiClient {
    async fn get_mod_info(&self, external_id: &str) -> Result<WorkshopItem> {
        let params = [
            ("itemcount", "1"),
            ("publishedfileids[0]", external_id),
        ];
        let response = self
            .http
            .post(PUBLISHED_FILE_DETAILS_URL)
            .form(&params)
            .send()
            .await?
            .error_for_status()?;

        let body: DetailsResponse = response.json().await?;
        let detail = body
            .response
            .publishedfiledetails
            .into_iter()
            .next()
            .ok_or_else(|| {
                LifecycleError::Steam(format!(
                    "empty publishedfiledetails response for item {}",
                    external_id
                ))
            })?;

        if detail.result != RESULT_OK {
            return Err(LifecycleError::ItemUnavailable(external_id.to_string()));
        }

        let updated_at = DateTime::from_timestamp(detail.time_updated, 0).ok_or_else(|| {
            LifecycleError::Steam(format!(
                "item {} carries invalid time_updated {}",
                external_id, detail.time_updated
            ))
        })?;

        Ok(WorkshopItem {
            name: detail
                .title
                .unwrap_or_else(|| external_id.to_string()),
            updated_at,
        })
    }
}
