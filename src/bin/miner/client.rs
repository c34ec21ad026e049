//! Mining Rewards API Client

use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct StartSessionRequest {
    pub user_id: i64,
    pub extended: bool,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub id: i64,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub multiplier_bps: u32,
}

#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    pub accumulated: String,
    pub remaining_seconds: i64,
    pub daily_rate: String,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub accumulating: String,
    pub claimable: String,
    pub claimed: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitClaimRequest {
    pub user_id: i64,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub wallet_address: String,
    pub network: String,
}

#[derive(Debug, Deserialize)]
pub struct Claim {
    pub tracking_id: String,
    pub amount: String,
    pub usd_value: f64,
    pub processing_tier: String,
    pub status: String,
    pub submitted_at: String,
    pub processing_deadline: String,
    pub wallet_address: String,
    pub requires_verification: bool,
    pub recommended_action: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

/// Mining Rewards API client
pub struct MinerClient {
    client: Client,
    base_url: String,
}

impl MinerClient {
    pub fn new(server_url: &str) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
        match serde_json::from_str::<ApiError>(&text) {
            Ok(err) => Err(anyhow!("{} ({}): {}", what, err.code, err.message)),
            Err(_) => Err(anyhow!("{} ({}): {}", what, status, text)),
        }
    }

    pub async fn start_session(&self, user_id: i64, extended: bool) -> Result<Session> {
        let resp = self
            .client
            .post(self.url("sessions"))
            .json(&StartSessionRequest { user_id, extended })
            .send()
            .await?;
        Self::decode(resp, "Failed to start session").await
    }

    pub async fn session_status(&self, user_id: i64) -> Result<SessionStatus> {
        let resp = self
            .client
            .get(self.url(&format!("sessions/{}", user_id)))
            .send()
            .await?;
        Self::decode(resp, "Failed to fetch session").await
    }

    pub async fn balance(&self, user_id: i64) -> Result<Balance> {
        let resp = self
            .client
            .get(self.url(&format!("balances/{}", user_id)))
            .send()
            .await?;
        Self::decode(resp, "Failed to fetch balance").await
    }

    pub async fn submit_claim(&self, request: &SubmitClaimRequest) -> Result<Claim> {
        let resp = self
            .client
            .post(self.url("claims"))
            .json(request)
            .send()
            .await?;
        Self::decode(resp, "Claim rejected").await
    }

    pub async fn claim(&self, tracking_id: &str) -> Result<Claim> {
        let resp = self
            .client
            .get(self.url(&format!("claims/{}", tracking_id)))
            .send()
            .await?;
        Self::decode(resp, "Failed to fetch claim").await
    }

    pub async fn claim_history(&self, user_id: i64, limit: u32) -> Result<Vec<Claim>> {
        let resp = self
            .client
            .get(self.url(&format!("users/{}/claims?limit={}", user_id, limit)))
            .send()
            .await?;
        Self::decode(resp, "Failed to fetch history").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = MinerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_url() {
        let client = MinerClient::new("http://localhost:8080");
        assert_eq!(
            client.url("/users/7/claims?limit=10"),
            "http://localhost:8080/users/7/claims?limit=10"
        );
    }

    #[test]
    fn test_bulk_request_omits_amount() {
        let request = SubmitClaimRequest {
            user_id: 7,
            kind: "bulk",
            amount: None,
            wallet_address: "addr".to_string(),
            network: "TON".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("amount").is_none());
        assert_eq!(json["kind"], "bulk");
    }
}
