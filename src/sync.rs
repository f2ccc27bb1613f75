//! Two-way sync state machine.
//!
//! While syncing, every tick tries to move one cloud photo from a selected
//! album down and one local photo up. Whether a picked transfer finishes on
//! that tick is decided by a [`TransferDriver`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::photos::{human_size, Photo, PhotoSource, PhotoStore};

pub const ACTION_IDLE: &str = "Idle";
pub const ACTION_SCANNING: &str = "Scanning...";
pub const ACTION_ALL_SYNCED: &str = "All selected synced";
pub const ACTION_INDEXING: &str = "Indexing photos for AI...";
pub const ACTION_INDEX_UPDATED: &str = "Index Updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Decides whether a transfer picked on this tick completes.
pub trait TransferDriver: Send {
    fn complete(&mut self, photo: &Photo, direction: Direction) -> bool;
}

/// Completes each transfer with a fixed probability.
pub struct CoinFlip {
    probability: f64,
    rng: StdRng,
}

impl CoinFlip {
    pub fn new(probability: f64) -> Self {
        Self::with_rng(probability, StdRng::from_os_rng())
    }

    pub fn with_rng(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng,
        }
    }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self::with_rng(probability, StdRng::seed_from_u64(seed))
    }
}

impl TransferDriver for CoinFlip {
    fn complete(&mut self, _photo: &Photo, _direction: Direction) -> bool {
        self.rng.random_bool(self.probability)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub downloaded: Option<String>,
    pub uploaded: Option<String>,
    pub upload_queue: usize,
    pub download_queue: usize,
    pub current_action: String,
    pub state: SyncState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub total_files: usize,
    pub synced_files: usize,
    pub upload_queue: usize,
    pub download_queue: usize,
    pub is_syncing: bool,
    pub current_action: String,
    pub last_synced: Option<DateTime<Utc>>,
    pub storage_used: String,
    pub vector_index_count: usize,
}

pub struct SyncOrchestrator {
    state: SyncState,
    selected: BTreeSet<String>,
    driver: Box<dyn TransferDriver>,
    current_action: String,
    last_synced: Option<DateTime<Utc>>,
}

impl SyncOrchestrator {
    pub fn new(driver: Box<dyn TransferDriver>) -> Self {
        Self {
            state: SyncState::Idle,
            selected: BTreeSet::new(),
            driver,
            current_action: ACTION_IDLE.to_string(),
            last_synced: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn is_selected(&self, album: &str) -> bool {
        self.selected.contains(album)
    }

    pub fn current_action(&self) -> &str {
        &self.current_action
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Shows a non-transfer activity until the next tick or pause.
    pub fn set_action(&mut self, action: &str) {
        log::debug!("action: {action}");
        self.current_action = action.to_string();
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            log::info!("sync: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn start(&mut self) {
        self.set_state(SyncState::Syncing);
    }

    pub fn pause(&mut self) {
        self.set_state(SyncState::Idle);
        self.current_action = ACTION_IDLE.to_string();
    }

    pub fn toggle(&mut self) {
        match self.state {
            SyncState::Idle => self.start(),
            SyncState::Syncing => self.pause(),
        }
    }

    /// Returns whether the album is selected afterwards.
    pub fn toggle_album(&mut self, name: &str) -> bool {
        let selected = if self.selected.remove(name) {
            false
        } else {
            self.selected.insert(name.to_string());
            true
        };

        log::debug!("album {name:?} selected: {selected}");
        self.start();
        selected
    }

    pub fn select_all(&mut self, names: impl IntoIterator<Item = String>) {
        self.selected.extend(names);
        self.start();
    }

    /// Already synced photos stay synced.
    pub fn unselect_all(&mut self) {
        self.selected.clear();
        self.start();
    }

    /// New local photos need uploading.
    pub fn notify_local_added(&mut self) {
        self.start();
    }

    pub fn tick(&mut self, store: &mut PhotoStore) -> TickReport {
        if self.state != SyncState::Syncing {
            return self.report(store, None, None);
        }

        let download = store.download_candidates(&self.selected).next().cloned();
        let upload = store.upload_candidates().next().cloned();

        let downloaded = download.and_then(|photo| self.transfer(store, photo, Direction::Download));
        let uploaded = upload.and_then(|photo| self.transfer(store, photo, Direction::Upload));

        let mut actions = Vec::new();
        if let Some(name) = &downloaded {
            actions.push(format!("Downloading {name}..."));
        }
        if let Some(name) = &uploaded {
            actions.push(format!("Uploading {name}..."));
        }

        let download_queue = store.download_candidates(&self.selected).count();
        let upload_queue = store.upload_candidates().count();

        if download_queue == 0 && upload_queue == 0 {
            self.current_action = ACTION_ALL_SYNCED.to_string();
            self.last_synced = Some(Utc::now());
            self.set_state(SyncState::Idle);
        } else if actions.is_empty() {
            self.current_action = ACTION_SCANNING.to_string();
        } else {
            self.current_action = actions.join(" ");
        }

        self.report(store, downloaded, uploaded)
    }

    /// Returns the photo name when the transfer completed.
    fn transfer(&mut self, store: &mut PhotoStore, photo: Photo, direction: Direction) -> Option<String> {
        if !self.driver.complete(&photo, direction) {
            return None;
        }

        match store.mark_synced(&photo.id) {
            Ok(()) => {
                log::info!("{direction:?} complete: {} ({})", photo.name, photo.album);
                Some(photo.name)
            }
            Err(err) => {
                log::error!("failed to mark {} synced: {err}", photo.id);
                None
            }
        }
    }

    fn report(
        &self,
        store: &PhotoStore,
        downloaded: Option<String>,
        uploaded: Option<String>,
    ) -> TickReport {
        TickReport {
            downloaded,
            uploaded,
            upload_queue: store.upload_candidates().count(),
            download_queue: store.download_candidates(&self.selected).count(),
            current_action: self.current_action.clone(),
            state: self.state,
        }
    }

    pub fn status(&self, store: &PhotoStore, vector_index_count: usize) -> SyncStatus {
        SyncStatus {
            total_files: store.len(),
            synced_files: store.count_by_source(PhotoSource::Synced),
            upload_queue: store.upload_candidates().count(),
            download_queue: store.download_candidates(&self.selected).count(),
            is_syncing: self.is_syncing(),
            current_action: self.current_action.clone(),
            last_synced: self.last_synced,
            storage_used: human_size(store.total_bytes()),
            vector_index_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photos::tests::photo;

    struct Always(bool);

    impl TransferDriver for Always {
        fn complete(&mut self, _photo: &Photo, _direction: Direction) -> bool {
            self.0
        }
    }

    fn store() -> PhotoStore {
        let mut store = PhotoStore::new();
        store.add_all(vec![
            photo("pets-1", "Pets", PhotoSource::Cloud),
            photo("pets-2", "Pets", PhotoSource::Cloud),
            photo("food-1", "Food", PhotoSource::Cloud),
            photo("mine", "Local Drive", PhotoSource::Local),
        ]);
        store
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));

        let report = sync.tick(&mut store);
        assert_eq!(report.state, SyncState::Idle);
        assert!(report.downloaded.is_none() && report.uploaded.is_none());
        assert_eq!(store.count_by_source(PhotoSource::Synced), 0);
        assert_eq!(sync.current_action(), ACTION_IDLE);
    }

    #[test]
    fn test_tick_moves_one_each_way() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));
        sync.toggle_album("Pets");

        let report = sync.tick(&mut store);
        assert_eq!(report.downloaded.as_deref(), Some("pets-1.jpg"));
        assert_eq!(report.uploaded.as_deref(), Some("mine.jpg"));
        assert_eq!(report.current_action, "Downloading pets-1.jpg... Uploading mine.jpg...");
        assert_eq!(report.download_queue, 1);
        assert_eq!(report.upload_queue, 0);
        assert_eq!(report.state, SyncState::Syncing);

        let report = sync.tick(&mut store);
        assert_eq!(report.current_action, ACTION_ALL_SYNCED);
        assert_eq!(report.state, SyncState::Idle);
        assert!(sync.last_synced().is_some());

        // unselected album untouched
        assert_eq!(store.get("food-1").unwrap().source, PhotoSource::Cloud);
    }

    #[test]
    fn test_nothing_completes_while_scanning() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(false)));
        sync.toggle_album("Pets");

        let report = sync.tick(&mut store);
        assert_eq!(report.current_action, ACTION_SCANNING);
        assert_eq!(report.state, SyncState::Syncing);
        assert_eq!(report.download_queue, 2);
        assert_eq!(report.upload_queue, 1);
    }

    #[test]
    fn test_empty_queues_go_idle() {
        let mut store = PhotoStore::new();
        store.add(photo("a", "Pets", PhotoSource::Cloud)).unwrap();

        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));
        sync.start();

        // nothing selected, nothing local
        let report = sync.tick(&mut store);
        assert_eq!(report.state, SyncState::Idle);
        assert_eq!(report.current_action, ACTION_ALL_SYNCED);
        assert_eq!(store.get("a").unwrap().source, PhotoSource::Cloud);
    }

    #[test]
    fn test_selection_controls() {
        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));

        assert!(sync.toggle_album("Pets"));
        assert!(sync.is_syncing());
        assert!(!sync.toggle_album("Pets"));
        assert!(!sync.is_selected("Pets"));

        sync.select_all(vec!["Pets".to_string(), "Food".to_string()]);
        assert_eq!(sync.selected().len(), 2);

        sync.pause();
        assert_eq!(sync.state(), SyncState::Idle);

        sync.unselect_all();
        assert!(sync.selected().is_empty());
        assert!(sync.is_syncing());

        sync.toggle();
        assert!(!sync.is_syncing());
        sync.toggle();
        assert!(sync.is_syncing());
    }

    #[test]
    fn test_deselect_keeps_synced() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));
        sync.toggle_album("Pets");
        sync.tick(&mut store);

        sync.toggle_album("Pets");
        sync.tick(&mut store);
        assert_eq!(store.get("pets-1").unwrap().source, PhotoSource::Synced);
        assert_eq!(store.get("pets-2").unwrap().source, PhotoSource::Cloud);
    }

    #[test]
    fn test_status() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(true)));
        sync.toggle_album("Food");
        sync.tick(&mut store);

        let status = sync.status(&store, 3);
        assert_eq!(status.total_files, 4);
        assert_eq!(status.synced_files, 2);
        assert_eq!(status.download_queue, 0);
        assert_eq!(status.upload_queue, 0);
        assert!(!status.is_syncing);
        assert_eq!(status.storage_used, "4.0 MB");
        assert_eq!(status.vector_index_count, 3);
    }

    #[test]
    fn test_set_action_lasts_until_next_tick() {
        let mut store = store();
        let mut sync = SyncOrchestrator::new(Box::new(Always(false)));

        sync.set_action(ACTION_INDEX_UPDATED);
        assert_eq!(sync.status(&store, 0).current_action, ACTION_INDEX_UPDATED);

        // idle ticks leave it alone
        sync.tick(&mut store);
        assert_eq!(sync.current_action(), ACTION_INDEX_UPDATED);

        sync.toggle_album("Pets");
        sync.tick(&mut store);
        assert_eq!(sync.current_action(), ACTION_SCANNING);
    }

    #[test]
    fn test_coin_flip_is_reproducible() {
        let p = photo("a", "Pets", PhotoSource::Cloud);
        let mut a = CoinFlip::seeded(0.6, 7);
        let mut b = CoinFlip::seeded(0.6, 7);

        let flips_a: Vec<bool> = (0..32).map(|_| a.complete(&p, Direction::Download)).collect();
        let flips_b: Vec<bool> = (0..32).map(|_| b.complete(&p, Direction::Download)).collect();
        assert_eq!(flips_a, flips_b);

        let mut never = CoinFlip::seeded(0.0, 7);
        let mut always = CoinFlip::seeded(1.0, 7);
        assert!(!never.complete(&p, Direction::Upload));
        assert!(always.complete(&p, Direction::Upload));
    }
}
