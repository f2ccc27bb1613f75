mod sync;

use crate::{
    app::Session,
    expansion::{Expanders, SynonymExpander},
    photos::{Photo, PhotoSource},
    search::SearchMode,
    semantic::SemanticSearchService,
    sync::{CoinFlip, SyncOrchestrator},
};

pub fn photo(id: &str, album: &str, tags: &[&str], source: PhotoSource) -> Photo {
    let mut photo = crate::photos::tests::photo(id, album, source);
    photo.tags = tags.iter().map(|t| t.to_string()).collect();
    photo
}

/// A session that never touches the network.
pub fn offline_session(driver: SyncOrchestrator) -> Session {
    Session::new(
        "usr_1",
        driver,
        SemanticSearchService::default(),
        SearchMode::LocalVector,
        Expanders {
            cloud: Box::new(SynonymExpander),
            local: Box::new(SynonymExpander),
        },
    )
}

pub fn seeded_sync(seed: u64) -> SyncOrchestrator {
    SyncOrchestrator::new(Box::new(CoinFlip::seeded(0.6, seed)))
}

/// Serves `router` on an ephemeral local port from a background thread and
/// returns its base url.
pub fn serve_fake(router: axum::Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });

    format!("http://{addr}")
}
