use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSource {
    Local,
    Cloud,
    Synced,
}

impl PhotoSource {
    /// Sources only ever move forward to `Synced`.
    pub fn can_transition_to(self, next: PhotoSource) -> bool {
        matches!(
            (self, next),
            (PhotoSource::Local, PhotoSource::Synced) | (PhotoSource::Cloud, PhotoSource::Synced)
        )
    }
}

impl std::fmt::Display for PhotoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhotoSource::Local => "local",
            PhotoSource::Cloud => "cloud",
            PhotoSource::Synced => "synced",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub owner_id: String,
    pub url: String,
    pub name: String,
    pub album: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub source: PhotoSource,
    /// Size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Photo {
    pub fn is_indexed(&self) -> bool {
        self.embedding.is_some()
    }

    /// Text fed to the embedding generator.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name,
            self.album,
            self.tags.join(" "),
            self.description.as_deref().unwrap_or_default()
        )
    }

    /// Lowercased text matched against expanded keywords in cloud search.
    pub fn keyword_haystack(&self) -> String {
        format!("{} {} {}", self.name, self.album, self.tags.join(" ")).to_lowercase()
    }
}

/// Derived per-album view, recomputed from the store on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub cover_url: String,
    pub count: usize,
    pub sync_enabled: bool,
}

/// The collection of photo records; newest ingestions come first.
#[derive(Debug, Clone, Default)]
pub struct PhotoStore {
    photos: Vec<Photo>,
    positions: HashMap<String, usize>,
}

impl PhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Photo> {
        self.photos.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.photos.iter().map(|p| p.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Photo> {
        self.positions.get(id).map(|&idx| &self.photos[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn add(&mut self, photo: Photo) -> Result<(), AppError> {
        if self.contains(&photo.id) {
            return Err(AppError::AlreadyExists(photo.id));
        }

        self.photos.insert(0, photo);
        self.reindex_positions();
        Ok(())
    }

    /// Prepends a batch keeping its order. Duplicate ids are skipped.
    pub fn add_all(&mut self, photos: Vec<Photo>) -> usize {
        let mut seen = HashSet::new();
        let fresh: Vec<Photo> = photos
            .into_iter()
            .filter(|photo| {
                let keep = !self.contains(&photo.id) && seen.insert(photo.id.clone());
                if !keep {
                    log::warn!("skipping duplicate photo {}", photo.id);
                }
                keep
            })
            .collect();

        let added = fresh.len();
        if added > 0 {
            self.photos.splice(0..0, fresh);
            self.reindex_positions();
        }
        added
    }

    pub fn mark_synced(&mut self, id: &str) -> Result<(), AppError> {
        let idx = *self.positions.get(id).ok_or(AppError::NotFound)?;
        let photo = &mut self.photos[idx];

        if !photo.source.can_transition_to(PhotoSource::Synced) {
            return Err(AppError::InvalidTransition {
                id: id.to_string(),
                from: photo.source,
                to: PhotoSource::Synced,
            });
        }

        photo.source = PhotoSource::Synced;
        Ok(())
    }

    /// Embeddings are attached once and never recomputed.
    pub fn attach_embedding(&mut self, id: &str, embedding: Vec<f32>) -> Result<bool, AppError> {
        let idx = *self.positions.get(id).ok_or(AppError::NotFound)?;
        let photo = &mut self.photos[idx];

        if photo.embedding.is_some() {
            return Ok(false);
        }

        photo.embedding = Some(embedding);
        Ok(true)
    }

    pub fn unindexed(&self) -> Vec<String> {
        self.photos
            .iter()
            .filter(|p| !p.is_indexed())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn albums(&self, selected: &BTreeSet<String>) -> Vec<Album> {
        let mut albums: Vec<Album> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();

        for photo in &self.photos {
            match by_name.get(photo.album.as_str()) {
                Some(&idx) => albums[idx].count += 1,
                None => {
                    by_name.insert(photo.album.as_str(), albums.len());
                    albums.push(Album {
                        name: photo.album.clone(),
                        cover_url: photo.url.clone(),
                        count: 1,
                        sync_enabled: selected.contains(&photo.album),
                    });
                }
            }
        }

        albums
    }

    pub fn album_names(&self) -> Vec<String> {
        self.albums(&BTreeSet::new())
            .into_iter()
            .map(|album| album.name)
            .collect()
    }

    /// Cloud photos in selected albums, store order.
    pub fn download_candidates<'a>(
        &'a self,
        selected: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a Photo> + 'a {
        self.photos
            .iter()
            .filter(move |p| p.source == PhotoSource::Cloud && selected.contains(&p.album))
    }

    /// Local photos, store order. Uploads are not album-gated.
    pub fn upload_candidates(&self) -> impl Iterator<Item = &Photo> {
        self.photos
            .iter()
            .filter(|p| p.source == PhotoSource::Local)
    }

    pub fn count_by_source(&self, source: PhotoSource) -> usize {
        self.photos.iter().filter(|p| p.source == source).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.photos.iter().map(|p| p.size).sum()
    }

    fn reindex_positions(&mut self) {
        self.positions = self
            .photos
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id.clone(), idx))
            .collect();
    }
}

/// Formats a byte count the way the dashboard shows it, e.g. `4.2 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn photo(id: &str, album: &str, source: PhotoSource) -> Photo {
        Photo {
            id: id.to_string(),
            owner_id: "usr_1".to_string(),
            url: format!("https://example.com/{id}.jpg"),
            name: format!("{id}.jpg"),
            album: album.to_string(),
            tags: vec![],
            description: None,
            date: Utc::now(),
            source,
            size: 1024 * 1024,
            embedding: None,
        }
    }

    #[test]
    fn test_source_transitions_only_forward() {
        assert!(PhotoSource::Local.can_transition_to(PhotoSource::Synced));
        assert!(PhotoSource::Cloud.can_transition_to(PhotoSource::Synced));
        assert!(!PhotoSource::Synced.can_transition_to(PhotoSource::Cloud));
        assert!(!PhotoSource::Synced.can_transition_to(PhotoSource::Local));
        assert!(!PhotoSource::Local.can_transition_to(PhotoSource::Cloud));
        assert!(!PhotoSource::Synced.can_transition_to(PhotoSource::Synced));
    }

    #[test]
    fn test_add_prepends_and_rejects_duplicates() {
        let mut store = PhotoStore::new();
        store.add(photo("a", "Pets", PhotoSource::Cloud)).unwrap();
        store.add(photo("b", "Pets", PhotoSource::Cloud)).unwrap();

        assert_eq!(store.ids(), vec!["b", "a"]);
        assert!(matches!(
            store.add(photo("a", "Food", PhotoSource::Local)),
            Err(AppError::AlreadyExists(id)) if id == "a"
        ));
        assert_eq!(store.get("a").unwrap().album, "Pets");
    }

    #[test]
    fn test_add_all_keeps_batch_order() {
        let mut store = PhotoStore::new();
        store.add(photo("old", "Pets", PhotoSource::Cloud)).unwrap();

        let added = store.add_all(vec![
            photo("n1", "Local Drive", PhotoSource::Local),
            photo("n2", "Local Drive", PhotoSource::Local),
            photo("old", "Local Drive", PhotoSource::Local),
            photo("n1", "Local Drive", PhotoSource::Local),
        ]);

        assert_eq!(added, 2);
        assert_eq!(store.ids(), vec!["n1", "n2", "old"]);
        assert_eq!(store.get("n2").unwrap().source, PhotoSource::Local);
    }

    #[test]
    fn test_mark_synced_never_reverses() {
        let mut store = PhotoStore::new();
        store.add(photo("a", "Pets", PhotoSource::Cloud)).unwrap();

        store.mark_synced("a").unwrap();
        assert_eq!(store.get("a").unwrap().source, PhotoSource::Synced);

        assert!(matches!(
            store.mark_synced("a"),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(store.mark_synced("missing"), Err(AppError::NotFound)));
    }

    #[test]
    fn test_attach_embedding_once() {
        let mut store = PhotoStore::new();
        store.add(photo("a", "Pets", PhotoSource::Cloud)).unwrap();
        assert_eq!(store.unindexed(), vec!["a"]);

        assert!(store.attach_embedding("a", vec![1.0, 0.0]).unwrap());
        assert!(!store.attach_embedding("a", vec![0.0, 1.0]).unwrap());
        assert_eq!(store.get("a").unwrap().embedding, Some(vec![1.0, 0.0]));
        assert!(store.unindexed().is_empty());
    }

    #[test]
    fn test_albums_view() {
        let mut store = PhotoStore::new();
        store.add(photo("a", "Pets", PhotoSource::Cloud)).unwrap();
        store.add(photo("b", "Food", PhotoSource::Cloud)).unwrap();
        store.add(photo("c", "Pets", PhotoSource::Cloud)).unwrap();

        let selected = BTreeSet::from(["Pets".to_string()]);
        let albums = store.albums(&selected);

        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].name, "Pets");
        assert_eq!(albums[0].count, 2);
        assert_eq!(albums[0].cover_url, "https://example.com/c.jpg");
        assert!(albums[0].sync_enabled);
        assert_eq!(albums[1].name, "Food");
        assert!(!albums[1].sync_enabled);
    }

    #[test]
    fn test_candidates() {
        let mut store = PhotoStore::new();
        store.add(photo("pets", "Pets", PhotoSource::Cloud)).unwrap();
        store.add(photo("food", "Food", PhotoSource::Cloud)).unwrap();
        store.add(photo("mine", "Local Drive", PhotoSource::Local)).unwrap();
        store.add(photo("done", "Pets", PhotoSource::Synced)).unwrap();

        let selected = BTreeSet::from(["Pets".to_string()]);
        let downloads: Vec<_> = store.download_candidates(&selected).map(|p| &p.id).collect();
        let uploads: Vec<_> = store.upload_candidates().map(|p| &p.id).collect();

        assert_eq!(downloads, vec!["pets"]);
        assert_eq!(uploads, vec!["mine"]);
    }

    #[test]
    fn test_search_text_and_haystack() {
        let mut p = photo("p1", "Pets", PhotoSource::Cloud);
        p.tags = vec!["Beach".to_string(), "dog".to_string()];
        p.description = Some("A good boy".to_string());

        assert_eq!(p.search_text(), "p1.jpg Pets Beach dog A good boy");
        assert_eq!(p.keyword_haystack(), "p1.jpg pets beach dog");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(4_404_019), "4.2 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
