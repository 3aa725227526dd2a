use std::{num::NonZeroUsize, path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use iori_pacer::{
    timeline::{Clock, TemplateTimeline},
    HttpClient, SchedulerConfig, StreamType,
};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Serialize, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    #[serde(default)]
    pub scheduler: SchedulerOptions,
}

impl Config {
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(file)?;
        let config = toml::from_str(&data)?;
        Ok(config)
    }
}

/// One representation addressed through a `SegmentTemplate`.
#[derive(Serialize, Deserialize)]
pub struct StreamConfig {
    /// MIME type of the adaptation set, `video/mp4` by default
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub base_url: Url,
    pub media: String,
    pub initialization: Option<String>,
    pub representation: String,
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default = "default_start_number")]
    pub start_number: u64,
    pub duration: u64,
    #[serde(default = "default_timescale")]
    pub timescale: u64,
    /// Seconds
    pub minimum_buffer_time: Option<f64>,
    /// Seconds, for on-demand streams
    pub total_duration: Option<f64>,
    pub live: Option<LiveConfig>,
}

#[derive(Serialize, Deserialize)]
pub struct LiveConfig {
    pub availability_start: DateTime<Utc>,
    /// Seconds
    pub time_shift_buffer_depth: Option<f64>,
    /// Seconds
    #[serde(default)]
    pub suggested_presentation_delay: f64,
    pub clock_sync: Option<ClockSync>,
}

/// A `UTCTiming` element.
#[derive(Serialize, Deserialize)]
#[serde(tag = "scheme", content = "url", rename_all = "kebab-case")]
pub enum ClockSync {
    HttpIso(String),
    HttpHead(String),
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

fn default_start_number() -> u64 {
    1
}

fn default_timescale() -> u64 {
    1
}

impl StreamConfig {
    pub fn stream_type(&self) -> anyhow::Result<StreamType> {
        StreamType::from_mime_type(&self.mime_type)
            .ok_or_else(|| anyhow::anyhow!("Unsupported mime type: {}", self.mime_type))
    }

    pub async fn timeline(&self, client: &HttpClient) -> anyhow::Result<TemplateTimeline> {
        let mut builder = TemplateTimeline::builder(self.base_url.clone(), self.media.clone())
            .representation(self.representation.clone(), self.bandwidth)
            .start_number(self.start_number)
            .duration(self.duration, self.timescale);
        if let Some(initialization) = &self.initialization {
            builder = builder.initialization(initialization.clone());
        }
        if let Some(minimum_buffer_time) = self.minimum_buffer_time {
            builder = builder.minimum_buffer_time(Duration::from_secs_f64(minimum_buffer_time));
        }

        builder = match (&self.live, self.total_duration) {
            (Some(live), _) => {
                let clock = Arc::new(Clock::new());
                match &live.clock_sync {
                    Some(ClockSync::HttpIso(url)) => clock.sync_iso(client, url).await?,
                    Some(ClockSync::HttpHead(url)) => clock.sync_http_head(client, url).await?,
                    None => {}
                }
                builder.live(
                    live.availability_start,
                    live.time_shift_buffer_depth.map(Duration::from_secs_f64),
                    Duration::from_secs_f64(live.suggested_presentation_delay),
                    clock,
                )
            }
            (None, Some(total_duration)) => {
                builder.on_demand(Duration::from_secs_f64(total_duration))
            }
            (None, None) => anyhow::bail!("Either total_duration or [stream.live] is required"),
        };

        Ok(builder.build()?)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    pub max_in_flight: NonZeroUsize,
    pub max_retries: u32,
    /// Seconds
    pub buffer_depth: f64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self {
            max_in_flight: config.max_in_flight,
            max_retries: config.max_retries,
            buffer_depth: config.default_buffer_depth.as_secs_f64(),
        }
    }
}

impl From<SchedulerOptions> for SchedulerConfig {
    fn from(options: SchedulerOptions) -> Self {
        Self {
            max_in_flight: options.max_in_flight,
            max_retries: options.max_retries,
            default_buffer_depth: Duration::from_secs_f64(options.buffer_depth),
            ..Default::default()
        }
    }
}
