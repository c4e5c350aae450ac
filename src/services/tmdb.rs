// TMDB metadata provider service
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::config::MetadataConfig;
use crate::models::{Trailer, PLACEHOLDER_IMAGE, UNKNOWN};

const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// Anything that can describe a movie by its provider id. The seeder and
/// the admin lookup only need these two calls.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn movie_details(&self, tmdb_id: i64) -> Result<ProviderMovie>;

    async fn movie_trailer(&self, tmdb_id: i64) -> Result<Trailer>;
}

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    language: String,
}

/// Detailed movie info
#[derive(Debug, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub genres: Option<Vec<Genre>>,
    pub credits: Option<Credits>,
}

#[derive(Debug, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Credits response (crew only, cast is not used)
#[derive(Debug, Deserialize)]
pub struct Credits {
    pub crew: Option<Vec<CrewMember>>,
}

/// Crew member from TMDB credits
#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub id: i64,
    pub name: String,
    pub job: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoResults {
    #[serde(default)]
    results: Vec<Video>,
}

/// Entry of the movie videos listing
#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub site: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub official: bool,
}

/// Movie shaped for the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMovie {
    pub title: Option<String>,
    pub year: Option<i64>,
    pub rating: f64,
    pub genre: String,
    pub director: String,
    pub image: String,
    pub description: String,
    pub tmdb_id: i64,
}

impl From<MovieDetails> for ProviderMovie {
    fn from(details: MovieDetails) -> Self {
        let year = details
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|y| y.parse().ok());

        let genre = details
            .genres
            .map(|genres| {
                genres
                    .into_iter()
                    .map(|g| g.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let director = details
            .credits
            .and_then(|c| c.crew)
            .and_then(|crew| crew.into_iter().find(|p| p.job.as_deref() == Some("Director")))
            .map(|p| p.name)
            .unwrap_or_else(|| UNKNOWN.to_string());

        let image = details
            .poster_path
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/w500{}", TMDB_IMAGE_BASE, p))
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

        Self {
            title: details.title.filter(|t| !t.trim().is_empty()),
            year,
            rating: round_rating(details.vote_average.unwrap_or(0.0)),
            genre,
            director,
            image,
            description: details.overview.unwrap_or_default(),
            tmdb_id: details.id,
        }
    }
}

/// One decimal place, the precision shown in the catalog
fn round_rating(vote_average: f64) -> f64 {
    (vote_average * 10.0).round() / 10.0
}

/// Best trailer among the listed videos: an official or trailer-named
/// YouTube trailer, then any YouTube trailer, then any trailer, then the
/// first video.
pub fn pick_trailer(videos: &[Video]) -> Option<&Video> {
    let is_trailer = |v: &&Video| v.kind == "Trailer";
    let on_youtube = |v: &&Video| v.site == "YouTube";

    videos
        .iter()
        .filter(is_trailer)
        .filter(on_youtube)
        .find(|v| v.official || v.name.to_lowercase().contains("trailer"))
        .or_else(|| videos.iter().filter(is_trailer).find(on_youtube))
        .or_else(|| videos.iter().find(is_trailer))
        .or_else(|| videos.first())
}

/// Playable link for a video on a supported site
pub fn playable_trailer(video: &Video) -> Option<Trailer> {
    let key = video.key.as_deref().filter(|k| !k.is_empty())?;
    let url = match video.site.as_str() {
        "YouTube" => format!("https://www.youtube.com/watch?v={}", key),
        "Vimeo" => format!("https://vimeo.com/{}", key),
        _ => return None,
    };
    Some(Trailer {
        key: Some(key.to_string()),
        name: video.name.clone(),
        site: video.site.clone(),
        url,
    })
}

impl TmdbClient {
    /// Create a new TMDB client
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.tmdb_base_url.trim_end_matches('/').to_string(),
            api_key: config
                .tmdb_api_key
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            access_token: config
                .tmdb_access_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            language: config.language.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() || self.access_token.is_some()
    }

    fn get(&self, path: &str, query: &str) -> RequestBuilder {
        let url = format!(
            "{}{}?api_key={}&language={}{}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.language),
            query
        );
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Get movie details with credits
    pub async fn get_movie_details(&self, movie_id: i64) -> Result<MovieDetails> {
        let response = self
            .get(&format!("/movie/{}", movie_id), "&append_to_response=credits")
            .send()
            .await
            .context("Failed to get TMDB movie details")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "TMDB movie details failed with status: {}",
                response.status()
            );
        }

        response
            .json()
            .await
            .context("Failed to parse TMDB movie details response")
    }

    /// Get the videos listed for a movie
    pub async fn get_movie_videos(&self, movie_id: i64) -> Result<Vec<Video>> {
        let response = self
            .get(&format!("/movie/{}/videos", movie_id), "")
            .send()
            .await
            .context("Failed to get TMDB movie videos")?;

        if !response.status().is_success() {
            anyhow::bail!("TMDB movie videos failed with status: {}", response.status());
        }

        let videos: VideoResults = response
            .json()
            .await
            .context("Failed to parse TMDB movie videos response")?;
        Ok(videos.results)
    }
}

#[async_trait]
impl MetadataSource for TmdbClient {
    async fn movie_details(&self, tmdb_id: i64) -> Result<ProviderMovie> {
        let details = self.get_movie_details(tmdb_id).await?;
        Ok(details.into())
    }

    async fn movie_trailer(&self, tmdb_id: i64) -> Result<Trailer> {
        let videos = self.get_movie_videos(tmdb_id).await?;
        if videos.is_empty() {
            anyhow::bail!("No trailer is available for movie {}", tmdb_id);
        }

        pick_trailer(&videos)
            .and_then(playable_trailer)
            .with_context(|| format!("Trailer of movie {} is not on a supported site", tmdb_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video(name: &str, site: &str, kind: &str, official: bool) -> Video {
        Video {
            key: Some(format!("{}-key", name)),
            name: name.into(),
            site: site.into(),
            kind: kind.into(),
            official,
        }
    }

    fn client(server: &MockServer) -> TmdbClient {
        TmdbClient::new(&MetadataConfig {
            tmdb_api_key: Some("k".into()),
            tmdb_access_token: Some("tok".into()),
            tmdb_base_url: server.uri(),
            ..Default::default()
        })
    }

    #[test]
    fn test_configured_matches_config_credentials() {
        let cases = [
            (None, None),
            (Some("k"), None),
            (None, Some("tok")),
            (Some(" "), Some("")),
        ];
        for (key, token) in cases {
            let config = MetadataConfig {
                tmdb_api_key: key.map(String::from),
                tmdb_access_token: token.map(String::from),
                ..Default::default()
            };
            assert_eq!(
                TmdbClient::new(&config).is_configured(),
                config.has_credentials(),
                "{:?} {:?}",
                key,
                token
            );
        }
    }

    #[test]
    fn test_pick_trailer_order() {
        let videos = vec![
            video("Clip", "YouTube", "Clip", false),
            video("Teaser", "Vimeo", "Trailer", false),
            video("Main", "YouTube", "Trailer", false),
            video("Official", "YouTube", "Trailer", true),
        ];
        assert_eq!(pick_trailer(&videos).unwrap().name, "Official");
        assert_eq!(pick_trailer(&videos[..3]).unwrap().name, "Main");
        assert_eq!(pick_trailer(&videos[..2]).unwrap().name, "Teaser");
        assert_eq!(pick_trailer(&videos[..1]).unwrap().name, "Clip");
        assert!(pick_trailer(&[]).is_none());
    }

    #[test]
    fn test_playable_trailer_sites() {
        let yt = playable_trailer(&video("A", "YouTube", "Trailer", true)).unwrap();
        assert_eq!(yt.url, "https://www.youtube.com/watch?v=A-key");
        let vimeo = playable_trailer(&video("B", "Vimeo", "Trailer", true)).unwrap();
        assert_eq!(vimeo.url, "https://vimeo.com/B-key");
        assert!(playable_trailer(&video("C", "Dailymotion", "Trailer", true)).is_none());
    }

    #[test]
    fn test_details_shaping() {
        let details: MovieDetails = serde_json::from_value(json!({
            "id": 949,
            "title": "Heat",
            "release_date": "1995-12-15",
            "vote_average": 7.94,
            "overview": "Obsessive cop.",
            "poster_path": "/heat.jpg",
            "genres": [{"id": 28, "name": "Action"}, {"id": 80, "name": "Crime"}],
            "credits": {"crew": [
                {"id": 1, "name": "Art Linson", "job": "Producer"},
                {"id": 2, "name": "Michael Mann", "job": "Director"}
            ]}
        }))
        .unwrap();

        let movie = ProviderMovie::from(details);
        assert_eq!(movie.year, Some(1995));
        assert_eq!(movie.rating, 7.9);
        assert_eq!(movie.genre, "Action, Crime");
        assert_eq!(movie.director, "Michael Mann");
        assert_eq!(movie.image, "https://image.tmdb.org/t/p/w500/heat.jpg");

        let bare: MovieDetails = serde_json::from_value(json!({"id": 1})).unwrap();
        let bare = ProviderMovie::from(bare);
        assert_eq!(bare.title, None);
        assert_eq!(bare.genre, UNKNOWN);
        assert_eq!(bare.director, UNKNOWN);
        assert_eq!(bare.image, PLACEHOLDER_IMAGE);
        assert_eq!(bare.rating, 0.0);
    }

    #[tokio::test]
    async fn test_movie_details_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/603"))
            .and(query_param("append_to_response", "credits"))
            .and(query_param("api_key", "k"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 603, "title": "The Matrix", "release_date": "1999-03-30", "vote_average": 8.2
            })))
            .mount(&server)
            .await;

        let movie = client(&server).movie_details(603).await.unwrap();
        assert_eq!(movie.title.as_deref(), Some("The Matrix"));
        assert_eq!(movie.tmdb_id, 603);
    }

    #[tokio::test]
    async fn test_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/2/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "results": []})))
            .mount(&server)
            .await;

        let tmdb = client(&server);
        assert!(tmdb.movie_details(1).await.is_err());
        assert!(tmdb.movie_trailer(2).await.is_err());
    }
}
