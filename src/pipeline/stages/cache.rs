//! `logo_caching` stage.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::AppResult;
use crate::models::Channel;
use crate::pipeline::stage::{PipelineStage, Program, StageContext};

const LOGO_FETCH_TIMEOUT_SECS: u64 = 15;

pub struct LogoCachingStage;

#[async_trait]
impl PipelineStage for LogoCachingStage {
    fn id(&self) -> &'static str {
        "logo_caching"
    }
    fn name(&self) -> &'static str {
        "Logo Caching"
    }
    fn weight(&self) -> f64 {
        0.20
    }

    /// Best-effort: a failed fetch for one channel's logo is logged and
    /// the original URL is left in place, never failing the stage.
    async fn run(&self, _ctx: &StageContext<'_>, channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        let client = reqwest::Client::new();
        for channel in channels.iter_mut() {
            let Some(url) = channel.logo_url.clone() else { continue };
            match client.head(&url).timeout(Duration::from_secs(LOGO_FETCH_TIMEOUT_SECS)).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(target: "tvarr_core::pipeline", %url, "logo reachable");
                }
                Ok(response) => {
                    tracing::warn!(target: "tvarr_core::pipeline", %url, status = %response.status(), "logo fetch returned non-success, keeping original URL");
                }
                Err(err) => {
                    tracing::warn!(target: "tvarr_core::pipeline", %url, error = %err, "logo fetch failed, keeping original URL");
                }
            }
        }
        Ok(())
    }
}
