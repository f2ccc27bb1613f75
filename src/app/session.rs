use std::sync::Arc;

use anyhow::anyhow;

use crate::{
    cloud::{CloudPhotoProvider, Principal, ProviderError},
    config::Config,
    expansion::Expanders,
    photos::{Album, Photo, PhotoStore},
    search::{SearchCoordinator, SearchMode, SearchOutcome, SearchPlan, SearchRequest, SearchResults},
    semantic::{IndexReport, SemanticSearchService},
    sync::{CoinFlip, SyncOrchestrator, SyncStatus, TickReport, ACTION_INDEXING, ACTION_INDEX_UPDATED},
};

use super::errors::AppError;

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized => AppError::SessionExpired,
            ProviderError::Http(err) => AppError::Reqwest(err),
            ProviderError::Unexpected(msg) => AppError::Other(anyhow!(msg)),
        }
    }
}

/// Outcome of [`Session::load_cloud`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub added: usize,
    pub albums: usize,
    /// Albums whose listed count differs from the photos received.
    pub mismatched: Vec<String>,
}

/// Everything one signed-in user works with.
pub struct Session {
    owner_id: String,
    store: PhotoStore,
    sync: SyncOrchestrator,
    semantic: SemanticSearchService,
    search: SearchCoordinator,
    expanders: Arc<Expanders>,
}

impl Session {
    pub fn new(
        owner_id: &str,
        sync: SyncOrchestrator,
        semantic: SemanticSearchService,
        search_mode: SearchMode,
        expanders: Expanders,
    ) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            store: PhotoStore::new(),
            sync,
            semantic,
            search: SearchCoordinator::new(search_mode),
            expanders: Arc::new(expanders),
        }
    }

    pub fn from_config(config: &Config, owner_id: &str) -> Self {
        Self::new(
            owner_id,
            SyncOrchestrator::new(Box::new(CoinFlip::new(config.sync.completion_probability))),
            SemanticSearchService::from_config(config),
            config.search.default_mode,
            Expanders::from_config(&config.ai),
        )
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    pub fn semantic(&self) -> &SemanticSearchService {
        &self.semantic
    }

    pub fn expanders(&self) -> Arc<Expanders> {
        self.expanders.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    pub fn has_unindexed(&self) -> bool {
        self.store.iter().any(|photo| !photo.is_indexed())
    }

    /// Loads the principal's cloud library and checks it against the
    /// provider's album listing.
    pub fn load_cloud(
        &mut self,
        provider: &dyn CloudPhotoProvider,
        principal: &Principal,
    ) -> Result<LoadReport, AppError> {
        let albums = provider.fetch_albums(principal)?;
        let photos: Vec<Photo> = provider
            .fetch_photos(principal)?
            .into_iter()
            .map(|remote| remote.into_photo(&principal.id))
            .collect();

        let mismatched: Vec<String> = albums
            .iter()
            .filter(|album| {
                let loaded = photos.iter().filter(|p| p.album == album.title).count();
                loaded != album.count
            })
            .map(|album| album.title.clone())
            .collect();
        for title in &mismatched {
            log::warn!("album {title:?} is incomplete in {}", provider.name());
        }

        let added = self.store.add_all(photos);
        log::info!(
            "loaded {added} photos in {} albums from {} for {}",
            albums.len(),
            provider.name(),
            principal.id
        );

        Ok(LoadReport {
            added,
            albums: albums.len(),
            mismatched,
        })
    }

    pub fn add_local_photos(&mut self, photos: Vec<Photo>) -> usize {
        let added = self.store.add_all(photos);
        if added > 0 {
            self.sync.notify_local_added();
        }
        added
    }

    pub fn toggle_album(&mut self, name: &str) -> bool {
        self.sync.toggle_album(name)
    }

    /// Adds albums to the selection, leaving selected ones selected.
    pub fn select_albums(&mut self, names: &[String]) {
        self.sync.select_all(names.iter().cloned());
    }

    pub fn select_all_albums(&mut self) {
        self.sync.select_all(self.store.album_names());
    }

    pub fn unselect_all_albums(&mut self) {
        self.sync.unselect_all();
    }

    pub fn start_sync(&mut self) {
        self.sync.start();
    }

    pub fn pause_sync(&mut self) {
        self.sync.pause();
    }

    pub fn toggle_sync(&mut self) {
        self.sync.toggle();
    }

    pub fn sync_tick(&mut self) -> TickReport {
        self.sync.tick(&mut self.store)
    }

    /// Flags pending indexing in the status. Returns whether anything is
    /// waiting to be indexed.
    pub fn mark_indexing(&mut self) -> bool {
        let pending = self.has_unindexed();
        if pending {
            self.sync.set_action(ACTION_INDEXING);
        }
        pending
    }

    pub fn index_pending(&mut self) -> IndexReport {
        let report = self.semantic.index_batch(&mut self.store);
        if report.indexed > 0 {
            self.sync.set_action(ACTION_INDEX_UPDATED);
        }
        report
    }

    pub fn query(&self) -> &str {
        self.search.query()
    }

    pub fn set_query(&mut self, text: &str) -> SearchRequest {
        self.search.set_query(text)
    }

    pub fn set_mode(&mut self, mode: SearchMode) -> SearchRequest {
        self.search.set_mode(mode)
    }

    pub fn refresh_search(&mut self) -> SearchRequest {
        self.search.refresh()
    }

    pub fn begin_search(&mut self, request: SearchRequest) -> Option<SearchPlan> {
        self.search.begin(request, &self.store, &mut self.semantic)
    }

    pub fn complete_search(&mut self, outcome: SearchOutcome) -> bool {
        self.search.complete(outcome, &self.store)
    }

    /// Indexes pending photos and runs `query` inline.
    pub fn search_now(&mut self, query: &str) -> SearchResults {
        self.index_pending();
        let request = self.search.set_query(query);
        self.search
            .run_blocking(request, &self.store, &mut self.semantic, &self.expanders);
        self.results()
    }

    pub fn status(&self) -> SyncStatus {
        self.sync.status(&self.store, self.semantic.indexed_count())
    }

    pub fn albums(&self) -> Vec<Album> {
        self.store.albums(self.sync.selected())
    }

    pub fn results(&self) -> SearchResults {
        self.search.results(&self.store)
    }
}
