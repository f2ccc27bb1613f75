//! Cloud photo providers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::photos::{Photo, PhotoSource};

const GOOGLE_PHOTOS_API: &str = "https://photoslibrary.googleapis.com/v1";
const MOCK_ALBUMS: [&str; 5] = ["Vacation 2023", "Pets", "Family Reunion", "Food Blog", "Nature Hikes"];
const MOCK_PHOTO_COUNT: usize = 15;

/// The signed-in account a session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub token: String,
}

impl Principal {
    pub fn new(id: &str, token: &str) -> Self {
        Self {
            id: id.to_string(),
            token: token.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("session expired, reauthenticate")]
    Unauthorized,

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePhoto {
    pub id: String,
    pub url: String,
    pub name: String,
    pub album: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub size: u64,
}

impl RemotePhoto {
    pub fn into_photo(self, owner_id: &str) -> Photo {
        Photo {
            id: self.id,
            owner_id: owner_id.to_string(),
            url: self.url,
            name: self.name,
            album: self.album,
            tags: self.tags,
            description: self.description,
            date: self.date,
            source: PhotoSource::Cloud,
            size: self.size,
            embedding: None,
        }
    }
}

pub trait CloudPhotoProvider: Send + Sync {
    fn fetch_albums(&self, principal: &Principal) -> Result<Vec<RemoteAlbum>, ProviderError>;

    fn fetch_photos(&self, principal: &Principal) -> Result<Vec<RemotePhoto>, ProviderError>;

    fn name(&self) -> &'static str;
}

/// Deterministic fixture library, different for every principal.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockCloudProvider;

impl MockCloudProvider {
    fn seed(principal: &Principal) -> usize {
        principal.id.encode_utf16().last().unwrap_or(0) as usize
    }
}

impl CloudPhotoProvider for MockCloudProvider {
    fn fetch_albums(&self, principal: &Principal) -> Result<Vec<RemoteAlbum>, ProviderError> {
        let photos = self.fetch_photos(principal)?;

        let mut albums: Vec<RemoteAlbum> = Vec::new();
        for photo in photos {
            match albums.iter_mut().find(|a| a.title == photo.album) {
                Some(album) => album.count += 1,
                None => albums.push(RemoteAlbum {
                    id: format!("album-{}", albums.len()),
                    title: photo.album.clone(),
                    cover_url: Some(photo.url.clone()),
                    count: 1,
                }),
            }
        }

        Ok(albums)
    }

    fn fetch_photos(&self, principal: &Principal) -> Result<Vec<RemotePhoto>, ProviderError> {
        if principal.token.is_empty() {
            return Err(ProviderError::Unauthorized);
        }

        let seed = Self::seed(principal);
        let now = Utc::now();

        Ok((0..MOCK_PHOTO_COUNT)
            .map(|i| {
                // 1.0 to 5.9 MB
                let tenths = 10 + (seed * 7 + i * 13) % 50;
                RemotePhoto {
                    id: format!("cloud-photo-{}-{i}", principal.id),
                    url: format!("https://picsum.photos/seed/{}/400/400", seed + i + 500),
                    name: format!("IMG_CLOUD_{}.jpg", 20230000 + i),
                    album: MOCK_ALBUMS[(i + seed) % MOCK_ALBUMS.len()].to_string(),
                    tags: vec!["cloud".to_string(), "backup".to_string()],
                    description: None,
                    date: now - chrono::Duration::days(i as i64),
                    size: tenths as u64 * 1024 * 1024 / 10,
                }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Google Photos Library API.
pub struct GooglePhotosProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsPage {
    #[serde(default)]
    albums: Vec<GoogleAlbum>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAlbum {
    id: String,
    #[serde(default)]
    title: String,
    cover_photo_base_url: Option<String>,
    #[serde(default)]
    media_items_count: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemsPage {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItem {
    id: String,
    base_url: String,
    filename: String,
    description: Option<String>,
    media_metadata: Option<MediaMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<DateTime<Utc>>,
}

impl GooglePhotosProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder().timeout(timeout).build()?,
            base_url: GOOGLE_PHOTOS_API.to_string(),
        })
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ProviderError> {
        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized),
            status if !status.is_success() => Err(ProviderError::Unexpected(format!(
                "{} returned {status}",
                resp.url().path()
            ))),
            _ => Ok(resp),
        }
    }

    fn album_items(
        &self,
        principal: &Principal,
        album: &GoogleAlbum,
    ) -> Result<Vec<RemotePhoto>, ProviderError> {
        let mut photos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .post(format!("{}/mediaItems:search", self.base_url))
                .bearer_auth(&principal.token)
                .json(&json!({
                    "albumId": album.id,
                    "pageSize": 100,
                    "pageToken": page_token,
                }))
                .send()?;

            let page: MediaItemsPage = Self::check(resp)?.json()?;

            photos.extend(page.media_items.into_iter().map(|item| RemotePhoto {
                id: item.id,
                url: item.base_url,
                name: item.filename,
                album: album.title.clone(),
                tags: vec!["cloud".to_string()],
                description: item.description,
                date: item
                    .media_metadata
                    .and_then(|m| m.creation_time)
                    .unwrap_or_else(Utc::now),
                size: 0,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(photos)
    }

    fn list_albums(&self, principal: &Principal) -> Result<Vec<GoogleAlbum>, ProviderError> {
        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/albums", self.base_url))
                .bearer_auth(&principal.token)
                .query(&[("pageSize", "50")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: AlbumsPage = Self::check(request.send()?)?.json()?;
            albums.extend(page.albums);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(albums)
    }
}

impl CloudPhotoProvider for GooglePhotosProvider {
    fn fetch_albums(&self, principal: &Principal) -> Result<Vec<RemoteAlbum>, ProviderError> {
        Ok(self
            .list_albums(principal)?
            .into_iter()
            .map(|album| RemoteAlbum {
                count: album
                    .media_items_count
                    .as_deref()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0),
                id: album.id,
                title: album.title,
                cover_url: album.cover_photo_base_url,
            })
            .collect())
    }

    fn fetch_photos(&self, principal: &Principal) -> Result<Vec<RemotePhoto>, ProviderError> {
        let mut photos = Vec::new();
        for album in self.list_albums(principal)? {
            log::debug!("google photos: listing album {:?}", album.title);
            photos.extend(self.album_items(principal, &album)?);
        }
        Ok(photos)
    }

    fn name(&self) -> &'static str {
        "google_photos"
    }
}
