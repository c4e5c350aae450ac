// Admin form validation for manually added or edited movies

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::models::{NewMovie, PLACEHOLDER_IMAGE, UNKNOWN};

static RE_YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)[A-Za-z0-9_-]{11}")
        .unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title is required")]
    TitleRequired,

    #[error("Trailer URL must be a YouTube link (youtube.com/watch?v=..., youtu.be/... or youtube.com/embed/...)")]
    InvalidTrailerUrl,

    #[error("Enter the TMDB id of the movie")]
    ExternalIdRequired,

    #[error("Enter a valid TMDB id (a positive number)")]
    InvalidExternalId,
}

/// Movie form as typed by an administrator. Numeric fields arrive as text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovieDraft {
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub year: String,
    #[serde(deserialize_with = "text")]
    pub rating: String,
    pub genre: String,
    pub director: String,
    pub description: String,
    pub image: String,
    pub trailer_url: String,
    pub tmdb_id: Option<i64>,
}

impl MovieDraft {
    /// Validate and fill defaults, producing the record to store
    pub fn validate(&self) -> Result<NewMovie, ValidationError> {
        self.validate_in_year(chrono::Utc::now().year() as i64)
    }

    fn validate_in_year(&self, current_year: i64) -> Result<NewMovie, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleRequired);
        }

        let trailer_url = self.trailer_url.trim();
        if !trailer_url.is_empty() && !is_youtube_url(trailer_url) {
            return Err(ValidationError::InvalidTrailerUrl);
        }

        let year = leading_int(&self.year)
            .filter(|y| *y != 0)
            .unwrap_or(current_year);

        let rating = self
            .rating
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && (0.0..=10.0).contains(r))
            .unwrap_or(0.0);

        Ok(NewMovie {
            title: title.to_string(),
            year: Some(year),
            rating: Some(rating),
            genre: Some(or_default(&self.genre, UNKNOWN)),
            director: Some(or_default(&self.director, UNKNOWN)),
            description: Some(self.description.trim().to_string()),
            image: Some(or_default(&self.image, PLACEHOLDER_IMAGE)),
            tmdb_id: self.tmdb_id.filter(|id| *id > 0),
            trailer_url: (!trailer_url.is_empty()).then(|| trailer_url.to_string()),
        })
    }
}

pub fn is_youtube_url(url: &str) -> bool {
    RE_YOUTUBE_URL.is_match(url)
}

/// Parse the provider id typed into the lookup box
pub fn parse_external_id(input: &str) -> Result<i64, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::ExternalIdRequired);
    }
    match leading_int(input) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidExternalId),
    }
}

/// Integer prefix of a string, so "1999 (remaster)" reads as 1999
fn leading_int(input: &str) -> Option<i64> {
    let input = input.trim();
    let (sign, digits) = match input.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, input.strip_prefix('+').unwrap_or(input)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

fn or_default(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        v => v.to_string(),
    }
}

/// Accepts strings, numbers and null as form text
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
