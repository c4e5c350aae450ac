// Trailer lookup for manually added movies

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::tmdb::MetadataSource;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API search, used when the metadata provider has no trailer
pub struct YoutubeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl YoutubeClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, YOUTUBE_API_BASE)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// First embeddable video matching `query`, as a watch URL
    pub async fn search(&self, query: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/search?part=snippet&type=video&maxResults=1&videoEmbeddable=true&safeSearch=moderate&q={}&key={}",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(&self.api_key)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to search YouTube")?;

        if !response.status().is_success() {
            anyhow::bail!("YouTube search failed with status: {}", response.status());
        }

        let results: SearchResults = response
            .json()
            .await
            .context("Failed to parse YouTube search response")?;

        Ok(results
            .items
            .into_iter()
            .find_map(|item| item.id.video_id)
            .map(|id| format!("https://www.youtube.com/watch?v={}", id)))
    }

    /// Official trailer first, then any trailer
    pub async fn find_trailer(&self, title: &str, year: Option<i64>) -> Option<String> {
        let base = match year {
            Some(year) => format!("{} {}", title, year),
            None => title.to_string(),
        };

        for query in [format!("{} official trailer", base), format!("{} trailer", base)] {
            match self.search(&query).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => {}
                Err(e) => tracing::debug!("YouTube search '{}' failed: {}", query, e),
            }
        }
        None
    }
}

/// Trailer URL for a movie: the provider's trailer when it has one,
/// otherwise a YouTube search by title and year
pub async fn find_best_trailer_url(
    source: &dyn MetadataSource,
    youtube: Option<&YoutubeClient>,
    tmdb_id: Option<i64>,
    title: &str,
    year: Option<i64>,
) -> Option<String> {
    if let Some(tmdb_id) = tmdb_id {
        match source.movie_trailer(tmdb_id).await {
            Ok(trailer) => return Some(trailer.url),
            Err(e) => tracing::debug!("No provider trailer for {}: {}", tmdb_id, e),
        }
    }

    youtube?.find_trailer(title, year).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trailer;
    use crate::services::tmdb::ProviderMovie;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoTrailers;

    #[async_trait]
    impl MetadataSource for NoTrailers {
        async fn movie_details(&self, tmdb_id: i64) -> Result<ProviderMovie> {
            anyhow::bail!("unknown movie {}", tmdb_id)
        }

        async fn movie_trailer(&self, tmdb_id: i64) -> Result<Trailer> {
            anyhow::bail!("no trailer for {}", tmdb_id)
        }
    }

    struct FixedTrailer;

    #[async_trait]
    impl MetadataSource for FixedTrailer {
        async fn movie_details(&self, tmdb_id: i64) -> Result<ProviderMovie> {
            anyhow::bail!("unknown movie {}", tmdb_id)
        }

        async fn movie_trailer(&self, _tmdb_id: i64) -> Result<Trailer> {
            Ok(Trailer {
                key: Some("abcdefghijk".into()),
                name: "Official Trailer".into(),
                site: "YouTube".into(),
                url: "https://www.youtube.com/watch?v=abcdefghijk".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_provider_trailer_wins() {
        let url = find_best_trailer_url(&FixedTrailer, None, Some(949), "Heat", Some(1995)).await;
        assert_eq!(url.as_deref(), Some("https://www.youtube.com/watch?v=abcdefghijk"));

        // Without a provider id the provider is never asked
        assert_eq!(find_best_trailer_url(&FixedTrailer, None, None, "Heat", None).await, None);
    }

    #[tokio::test]
    async fn test_falls_back_to_plain_trailer_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Heat 1995 official trailer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Heat 1995 trailer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": {"kind": "youtube#video", "videoId": "0xbBLJ1WGwQ"}}]
            })))
            .mount(&server)
            .await;

        let youtube = YoutubeClient::with_base_url("yt".into(), &server.uri());
        let url = find_best_trailer_url(&NoTrailers, Some(&youtube), Some(949), "Heat", Some(1995)).await;
        assert_eq!(url.as_deref(), Some("https://www.youtube.com/watch?v=0xbBLJ1WGwQ"));
    }
}
