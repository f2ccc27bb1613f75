use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod cloud;
mod config;
mod eid;
mod expansion;
mod ingest;
mod photos;
mod search;
mod semantic;
mod storage;
mod sync;
#[cfg(test)]
mod tests;
mod web;

use app::{runtime, RuntimeConfig, Session};
use cli::SessionArgs;
use cloud::{CloudPhotoProvider, GooglePhotosProvider, MockCloudProvider, Principal};
use config::Config;

const DEMO_TOKEN: &str = "demo";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds a session for the requested account and loads its libraries.
fn build_session(config: &Config, args: &SessionArgs) -> anyhow::Result<Session> {
    let mut session = Session::from_config(config, &args.user);

    let (provider, principal): (Box<dyn CloudPhotoProvider>, Principal) = match &args.token {
        Some(token) => (
            Box::new(GooglePhotosProvider::new(Duration::from_secs(
                config.ai.request_timeout_secs,
            ))?),
            Principal::new(&args.user, token),
        ),
        None => (
            Box::new(MockCloudProvider),
            Principal::new(&args.user, DEMO_TOKEN),
        ),
    };

    session
        .load_cloud(provider.as_ref(), &principal)
        .context("failed to load cloud library")?;

    if let Some(folder) = &args.folder {
        let photos = ingest::scan_folder(folder, &args.user, ingest::DEFAULT_SCAN_LIMIT)
            .with_context(|| format!("failed to scan {folder:?}"))?;
        session.add_local_photos(photos);
    }

    Ok(session)
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let config = Config::load_with(Config::default_base_path()?)?;

    match args.command {
        cli::Command::Daemon { session, listen } => {
            let listen = listen.unwrap_or_else(|| config.web.listen.clone());
            let session = build_session(&config, &session)?;
            let owner_id = session.owner_id().to_string();
            let handle = runtime::spawn(session, RuntimeConfig::from_config(&config));

            web::start_daemon(handle, &owner_id, &listen)
        }

        cli::Command::Search {
            query,
            mode,
            session,
        } => {
            let mut session = build_session(&config, &session)?;
            if let Some(mode) = mode {
                session.set_mode(mode.into());
            }

            let results = session.search_now(&query);
            let photos: Vec<_> = results
                .photo_ids
                .iter()
                .filter_map(|id| session.store().get(id))
                .map(|photo| {
                    serde_json::json!({
                        "id": photo.id,
                        "name": photo.name,
                        "album": photo.album,
                        "tags": photo.tags,
                        "source": photo.source,
                    })
                })
                .collect();

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "query": results.query,
                    "mode": results.mode,
                    "active_tags": results.active_tags,
                    "photos": photos,
                }))?
            );
            Ok(())
        }

        cli::Command::Sync {
            album,
            all,
            max_ticks,
            fast,
            session,
        } => {
            let mut session = build_session(&config, &session)?;

            if all {
                session.select_all_albums();
            }
            let known = session.albums();
            for name in &album {
                if !known.iter().any(|a| &a.name == name) {
                    log::warn!("album {name:?} not found");
                }
            }
            session.select_albums(&album);
            session.start_sync();

            let interval = Duration::from_millis(config.sync.tick_interval_ms);
            let mut ticks = 0;
            while session.is_syncing() && ticks < max_ticks {
                if !fast {
                    std::thread::sleep(interval);
                }
                ticks += 1;

                let report = session.sync_tick();
                println!(
                    "[{ticks}] {} (download queue {}, upload queue {})",
                    report.current_action, report.download_queue, report.upload_queue
                );
            }

            println!("{}", serde_json::to_string_pretty(&session.status())?);
            Ok(())
        }

        cli::Command::Scan { dir, limit } => {
            let photos = ingest::scan_folder(&dir, "local", limit)?;
            println!("{}", serde_json::to_string_pretty(&photos)?);
            Ok(())
        }

        cli::Command::Embed { text } => {
            println!("{}", serde_json::to_string(&semantic::embed(&text))?);
            Ok(())
        }

        cli::Command::Config {} => {
            print!("{}", serde_yml::to_string(&config)?);
            Ok(())
        }
    }
}
