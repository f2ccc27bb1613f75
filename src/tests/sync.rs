use crate::{
    cloud::{MockCloudProvider, Principal},
    photos::{PhotoSource, PhotoStore},
    sync::{SyncState, ACTION_ALL_SYNCED},
};

use super::{offline_session, photo, seeded_sync};

#[test]
fn test_only_selected_album_downloads() {
    let mut store = PhotoStore::new();
    store.add_all(vec![
        photo("pets", "Pets", &[], PhotoSource::Cloud),
        photo("food", "Food", &[], PhotoSource::Cloud),
    ]);

    let mut sync = seeded_sync(1);
    sync.toggle_album("Pets");
    assert_eq!(sync.state(), SyncState::Syncing);

    for _ in 0..100 {
        let candidates: Vec<_> = store
            .download_candidates(sync.selected())
            .map(|p| p.id.clone())
            .collect();
        assert!(candidates.iter().all(|id| id == "pets"));

        sync.tick(&mut store);
        assert_eq!(store.get("food").unwrap().source, PhotoSource::Cloud);
    }

    assert_eq!(store.get("pets").unwrap().source, PhotoSource::Synced);
    assert_eq!(sync.state(), SyncState::Idle);
}

#[test]
fn test_queues_never_grow_between_ticks() {
    let mut session = offline_session(seeded_sync(42));
    session.add_local_photos(vec![
        photo("l1", "Local Drive", &["local"], PhotoSource::Local),
        photo("l2", "Local Drive", &["local"], PhotoSource::Local),
    ]);
    session
        .load_cloud(
            &MockCloudProvider,
            &Principal::new("usr_1", "token"),
        )
        .unwrap();
    session.select_all_albums();

    let mut last = session.status();
    for _ in 0..200 {
        if !session.is_syncing() {
            break;
        }
        let report = session.sync_tick();
        assert!(report.download_queue <= last.download_queue);
        assert!(report.upload_queue <= last.upload_queue);
        last = session.status();
    }

    assert_eq!(last.download_queue, 0);
    assert_eq!(last.upload_queue, 0);
    assert_eq!(last.synced_files, 17);
    assert_eq!(last.current_action, ACTION_ALL_SYNCED);
    assert!(!last.is_syncing);
    assert!(last.last_synced.is_some());
}

#[test]
fn test_sync_reaches_idle_for_many_seeds() {
    for seed in 0..20 {
        let mut session = offline_session(seeded_sync(seed));
        session
            .load_cloud(
                &MockCloudProvider,
                &Principal::new("usr_2", "token"),
            )
            .unwrap();
        session.add_local_photos(vec![photo("mine", "Local Drive", &[], PhotoSource::Local)]);
        session.toggle_album("Pets");

        let mut ticks = 0;
        while session.is_syncing() {
            session.sync_tick();
            ticks += 1;
            // 3 pets photos at p = 0.6, far below this bound
            assert!(ticks < 200, "seed {seed} did not finish");
        }

        let status = session.status();
        assert_eq!(status.download_queue, 0);
        assert_eq!(status.upload_queue, 0);
        assert_eq!(status.synced_files, 4);
    }
}

#[test]
fn test_unselect_keeps_synced_photos() {
    let mut session = offline_session(seeded_sync(3));
    session
        .load_cloud(
            &MockCloudProvider,
            &Principal::new("usr_1", "token"),
        )
        .unwrap();
    session.toggle_album("Pets");
    while session.is_syncing() {
        session.sync_tick();
    }
    let synced = session.status().synced_files;
    assert!(synced > 0);

    session.unselect_all_albums();
    assert!(session.is_syncing());
    session.sync_tick();

    let status = session.status();
    assert_eq!(status.synced_files, synced);
    assert!(!status.is_syncing);
    assert!(session.albums().iter().all(|album| !album.sync_enabled));
}

#[test]
fn test_adding_local_photo_restarts_sync() {
    let mut session = offline_session(seeded_sync(5));
    assert!(!session.is_syncing());

    session.add_local_photos(vec![photo("mine", "Local Drive", &[], PhotoSource::Local)]);
    assert!(session.is_syncing());
    assert_eq!(session.status().upload_queue, 1);
}
