//! Plex Media Server client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::LibraryConfig;

use super::{LibraryClient, LibraryConnector, LibraryError, MediaItem, ResourceSample, SessionStats};

/// Plex HTTP API client.
pub struct PlexClient {
    client: Client,
    url: String,
    token: String,
}

impl PlexClient {
    pub fn new(config: &LibraryConfig) -> Result<Self, LibraryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LibraryError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Checks the server answers and returns its machine identifier.
    pub async fn identity(&self) -> Result<String, LibraryError> {
        let body = self.get("/identity").await?;
        let parsed: Envelope<IdentityContainer> = parse(&body)?;
        Ok(parsed.media_container.machine_identifier)
    }

    async fn get(&self, endpoint: &str) -> Result<String, LibraryError> {
        let url = format!("{}{}", self.url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LibraryError::Timeout
                } else if e.is_connect() {
                    LibraryError::ConnectionFailed(e.to_string())
                } else {
                    LibraryError::ApiError(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LibraryError::Unauthorized),
            StatusCode::NOT_FOUND => Err(LibraryError::ApiError(format!("{} not found", endpoint))),
            status if !status.is_success() => {
                Err(LibraryError::ApiError(format!("HTTP {} for {}", status, endpoint)))
            }
            _ => response
                .text()
                .await
                .map_err(|e| LibraryError::ApiError(e.to_string())),
        }
    }

    async fn container_size(&self, endpoint: &str) -> Result<u32, LibraryError> {
        let body = self.get(endpoint).await?;
        let parsed: Envelope<SizedContainer> = parse(&body)?;
        Ok(parsed.media_container.size)
    }
}

#[async_trait]
impl LibraryClient for PlexClient {
    fn name(&self) -> &str {
        "plex"
    }

    async fn sessions(&self) -> Result<SessionStats, LibraryError> {
        let playing_sessions = self.container_size("/status/sessions").await?;
        let transcode_sessions = self.container_size("/transcode/sessions").await?;
        Ok(SessionStats {
            playing_sessions,
            transcode_sessions,
        })
    }

    async fn resources(&self) -> Result<Vec<ResourceSample>, LibraryError> {
        let body = self.get("/statistics/resources?timespan=6").await?;
        parse_resources(&body)
    }

    async fn section_items(&self, section: &str) -> Result<Vec<MediaItem>, LibraryError> {
        let body = match self.get(&format!("/library/sections/{}/all", section)).await {
            Err(LibraryError::ApiError(msg)) if msg.ends_with("not found") => {
                return Err(LibraryError::UnknownSection(section.to_string()))
            }
            other => other?,
        };
        let items = parse_section(section, &body)?;
        debug!(section = %section, count = items.len(), "Fetched library section");
        Ok(items)
    }

    async fn refresh_section(&self, section: &str) -> Result<(), LibraryError> {
        self.get(&format!("/library/sections/{}/refresh", section))
            .await
            .map(|_| ())
    }
}

/// Opens [`PlexClient`]s from the library configuration.
pub struct PlexConnector {
    config: LibraryConfig,
}

impl PlexConnector {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LibraryConnector for PlexConnector {
    async fn connect(&self) -> Result<Arc<dyn LibraryClient>, LibraryError> {
        let client = PlexClient::new(&self.config)?;
        let machine = client.identity().await?;
        debug!(machine = %machine, url = %self.config.url, "Connected to Plex");
        Ok(Arc::new(client))
    }
}

// Plex wraps every JSON payload in a `MediaContainer` object.

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityContainer {
    machine_identifier: String,
}

#[derive(Deserialize)]
struct SizedContainer {
    #[serde(default)]
    size: u32,
}

#[derive(Deserialize)]
struct ResourcesContainer {
    #[serde(rename = "StatisticsResources", default)]
    resources: Vec<PlexResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexResource {
    #[serde(default)]
    at: i64,
    #[serde(default)]
    host_cpu_utilization: f64,
    #[serde(default)]
    process_cpu_utilization: f64,
    #[serde(default)]
    host_memory_utilization: f64,
    #[serde(default)]
    process_memory_utilization: f64,
}

#[derive(Deserialize)]
struct SectionContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMetadata {
    rating_key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(rename = "Media", default)]
    media: Vec<PlexMedia>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMedia {
    container: Option<String>,
    video_codec: Option<String>,
    video_resolution: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bitrate: Option<u64>,
    duration: Option<u64>,
    #[serde(rename = "Part", default)]
    parts: Vec<PlexPart>,
}

#[derive(Deserialize)]
struct PlexPart {
    file: String,
    #[serde(default)]
    size: Option<u64>,
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, LibraryError> {
    serde_json::from_str(body).map_err(|e| LibraryError::ParseError(e.to_string()))
}

/// Resource samples sorted oldest first.
fn parse_resources(body: &str) -> Result<Vec<ResourceSample>, LibraryError> {
    let parsed: Envelope<ResourcesContainer> = parse(body)?;
    let mut resources = parsed.media_container.resources;
    resources.sort_by_key(|r| r.at);
    Ok(resources
        .into_iter()
        .map(|r| ResourceSample {
            host_cpu: r.host_cpu_utilization,
            host_memory: r.host_memory_utilization,
            process_cpu: r.process_cpu_utilization,
            process_memory: r.process_memory_utilization,
        })
        .collect())
}

/// Flattens a section listing into one [`MediaItem`] per metadata entry.
///
/// Metadata of the first media version is used; the locations cover every
/// part of every version, so multi-file items are visible as such.
fn parse_section(section: &str, body: &str) -> Result<Vec<MediaItem>, LibraryError> {
    let parsed: Envelope<SectionContainer> = parse(body)?;
    Ok(parsed
        .media_container
        .metadata
        .into_iter()
        .map(|meta| {
            let locations: Vec<String> = meta
                .media
                .iter()
                .flat_map(|m| m.parts.iter().map(|p| p.file.clone()))
                .collect();
            let size = meta
                .media
                .iter()
                .flat_map(|m| m.parts.iter().filter_map(|p| p.size))
                .reduce(|a, b| a + b);
            let mut item = MediaItem::new(meta.rating_key, meta.title, section, locations);
            item.size = size;
            item.duration = meta.duration;
            if let Some(first) = meta.media.into_iter().next() {
                item.container = first.container;
                item.video_codec = first.video_codec;
                item.video_resolution = first.video_resolution;
                item.width = first.width;
                item.height = first.height;
                item.bitrate = first.bitrate;
                item.duration = item.duration.or(first.duration);
            }
            item
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section() {
        let body = r#"{
            "MediaContainer": {
                "size": 2,
                "Metadata": [
                    {
                        "ratingKey": "101",
                        "title": "Heat",
                        "duration": 10200000,
                        "Media": [{
                            "container": "avi",
                            "videoCodec": "mpeg4",
                            "videoResolution": "480",
                            "width": 720,
                            "height": 480,
                            "bitrate": 1800,
                            "Part": [{ "file": "/data/movies/Heat (1995)/Heat.avi", "size": 1400000000 }]
                        }]
                    },
                    {
                        "ratingKey": "102",
                        "title": "Split",
                        "Media": [{
                            "container": "mkv",
                            "Part": [
                                { "file": "/data/movies/Split/cd1.mkv", "size": 10 },
                                { "file": "/data/movies/Split/cd2.mkv", "size": 20 }
                            ]
                        }]
                    }
                ]
            }
        }"#;

        let items = parse_section("1", body).unwrap();
        assert_eq!(items.len(), 2);

        let heat = &items[0];
        assert_eq!(heat.rating_key, "101");
        assert_eq!(heat.section, "1");
        assert_eq!(heat.video_codec.as_deref(), Some("mpeg4"));
        assert_eq!(heat.height, Some(480));
        assert_eq!(heat.size, Some(1_400_000_000));
        assert_eq!(heat.file_name(), Some("Heat.avi"));

        let split = &items[1];
        assert_eq!(split.locations.len(), 2);
        assert_eq!(split.size, Some(30));
        assert_eq!(split.file_name(), None);
    }

    #[test]
    fn test_parse_empty_section() {
        let items = parse_section("2", r#"{ "MediaContainer": { "size": 0 } }"#).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_resources_sorted_oldest_first() {
        let body = r#"{
            "MediaContainer": {
                "StatisticsResources": [
                    { "at": 200, "hostCpuUtilization": 50.0, "processCpuUtilization": 5.0,
                      "hostMemoryUtilization": 40.0, "processMemoryUtilization": 4.0 },
                    { "at": 100, "hostCpuUtilization": 10.0, "processCpuUtilization": 1.0,
                      "hostMemoryUtilization": 30.0, "processMemoryUtilization": 3.0 }
                ]
            }
        }"#;
        let samples = parse_resources(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].host_cpu, 10.0);
        assert_eq!(samples[1].process_memory, 4.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_section("1", "<html>"),
            Err(LibraryError::ParseError(_))
        ));
    }
}
