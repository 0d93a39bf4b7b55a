//! Client for the external video analytics provider.
//!
//! The provider returns aggregate view metrics for a recording. It is allowed
//! to be down: every failure path degrades to the documented `unavailable`
//! placeholder so an analytics report never fails on its VOD section.

use serde::{Deserialize, Serialize};

use crate::config::VodProviderConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodViewMetrics {
    pub available: bool,
    pub total_views: u64,
    pub total_watch_time_minutes: f64,
    pub avg_completion_pct: f64,
}

impl VodViewMetrics {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            total_views: 0,
            total_watch_time_minutes: 0.0,
            avg_completion_pct: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderViewStats {
    total_views: u64,
    total_watch_time_minutes: f64,
    avg_completion_pct: f64,
}

#[derive(Clone)]
pub struct VodMetricsClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl VodMetricsClient {
    pub fn new(config: &VodProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    pub async fn view_metrics(&self, video_id: &str) -> VodViewMetrics {
        let url = format!("{}/videos/{}/analytics/views", self.base_url, video_id);
        let result = async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            resp.error_for_status()?.json::<ProviderViewStats>().await
        }
        .await;

        match result {
            Ok(stats) => VodViewMetrics {
                available: true,
                total_views: stats.total_views,
                total_watch_time_minutes: stats.total_watch_time_minutes,
                avg_completion_pct: stats.avg_completion_pct,
            },
            Err(e) => {
                tracing::warn!(error = %e, video_id = %video_id, "vod analytics provider unavailable");
                VodViewMetrics::unavailable()
            }
        }
    }
}
