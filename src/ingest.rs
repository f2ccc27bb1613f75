//! Local folder ingestion.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::{
    eid::Eid,
    photos::{Photo, PhotoSource},
};

pub const LOCAL_ALBUM: &str = "Local Drive";
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// Turns the image files directly inside `dir` into local photo records.
///
/// Files are visited in name order and sniffed by content, not extension.
/// At most `limit` photos are returned.
pub fn scan_folder(dir: &Path, owner_id: &str, limit: usize) -> anyhow::Result<Vec<Photo>> {
    let mut entries = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    entries.sort();

    let mut photos = Vec::new();

    for path in entries {
        if photos.len() >= limit {
            break;
        }

        let is_image = match infer::get_from_path(&path) {
            Ok(Some(kind)) => kind.matcher_type() == infer::MatcherType::Image,
            Ok(None) => false,
            Err(err) => {
                log::warn!("skipping {path:?}: {err}");
                continue;
            }
        };

        if !is_image {
            log::debug!("skipping {path:?}: not an image");
            continue;
        }

        let metadata = std::fs::metadata(&path)?;
        let date = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        photos.push(Photo {
            id: Eid::prefixed("local").to_string(),
            owner_id: owner_id.to_string(),
            url: format!("file://{}", path.display()),
            name,
            album: LOCAL_ALBUM.to_string(),
            tags: vec!["local".to_string(), "pending".to_string()],
            description: None,
            date,
            source: PhotoSource::Local,
            size: metadata.len(),
            embedding: None,
        });
    }

    log::info!("found {} photos in {dir:?}", photos.len());

    Ok(photos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, 0x4A, 0x46, 0x49, 0x46];

    #[test]
    fn test_scan_picks_images_by_content() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.png"), PNG).unwrap();
        std::fs::write(tmp.path().join("a.dat"), JPEG).unwrap();
        std::fs::write(tmp.path().join("notes.jpg"), b"just text").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        let photos = scan_folder(tmp.path(), "usr_1", DEFAULT_SCAN_LIMIT).unwrap();
        let names: Vec<_> = photos.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a.dat", "b.png"]);

        let photo = &photos[1];
        assert!(photo.id.starts_with("local-"));
        assert_eq!(photo.owner_id, "usr_1");
        assert_eq!(photo.album, LOCAL_ALBUM);
        assert_eq!(photo.tags, vec!["local", "pending"]);
        assert_eq!(photo.source, PhotoSource::Local);
        assert_eq!(photo.size, PNG.len() as u64);
        assert!(photo.url.starts_with("file://"));
        assert_ne!(photos[0].id, photos[1].id);
    }

    #[test]
    fn test_scan_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(tmp.path().join(format!("{i}.png")), PNG).unwrap();
        }

        assert_eq!(scan_folder(tmp.path(), "usr_1", 3).unwrap().len(), 3);
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(scan_folder(&tmp.path().join("missing"), "usr_1", 10).is_err());
    }
}
