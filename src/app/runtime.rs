//! Single-writer runtime.
//!
//! One thread owns the [`Session`] and handles every event in arrival order:
//! commands from [`SessionHandle`]s, timer firings and finished searches.
//! Timers are sleeping threads that post back into the same channel; arming
//! a timer again bumps its generation so the earlier firing is ignored.

use std::{
    collections::HashMap,
    sync::{mpsc, Arc, Mutex},
    thread::{sleep, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;

use crate::{
    config::Config,
    eid::Eid,
    photos::{Album, Photo},
    search::{SearchMode, SearchOutcome, SearchRequest, SearchResults},
    sync::SyncStatus,
};

use super::{errors::AppError, session::Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Periodic while syncing.
    SyncTick,
    /// One-shot, re-armed on every store change.
    Indexing,
    /// One-shot, re-armed on every query or mode change.
    SearchDebounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub sync_tick: Duration,
    pub indexing_debounce: Duration,
    pub search_debounce: Duration,
}

impl RuntimeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sync_tick: Duration::from_millis(config.sync.tick_interval_ms),
            indexing_debounce: Duration::from_millis(config.indexing.debounce_ms),
            search_debounce: Duration::from_millis(config.search.debounce_ms),
        }
    }

    fn delay(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::SyncTick => self.sync_tick,
            TimerKind::Indexing => self.indexing_debounce,
            TimerKind::SearchDebounce => self.search_debounce,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Status,
    Albums,
    Results,
    ToggleAlbum(String),
    SelectAllAlbums,
    UnselectAllAlbums,
    StartSync,
    PauseSync,
    ToggleSync,
    SetQuery(String),
    SetMode(SearchMode),
    AddLocalPhotos(Vec<Photo>),
}

#[derive(Debug)]
pub enum Reply {
    Status(SyncStatus),
    Albums(Vec<Album>),
    Results(SearchResults),
    Selected(bool),
    Added(usize),
    Done,
}

enum Event {
    Command(Command, mpsc::Sender<Reply>),
    Timer(TimerKind, u64),
    SearchCompleted(SearchOutcome),
    Shutdown,
}

struct Timers {
    tx: mpsc::Sender<Event>,
    config: RuntimeConfig,
    armed: HashMap<TimerKind, u64>,
    next_generation: u64,
}

impl Timers {
    fn arm(&mut self, kind: TimerKind) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed.insert(kind, generation);

        let tx = self.tx.clone();
        let delay = self.config.delay(kind);
        std::thread::spawn(move || {
            sleep(delay);
            // receiver is gone after shutdown
            let _ = tx.send(Event::Timer(kind, generation));
        });
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.armed.remove(&kind);
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    /// Consumes a firing. False when it was superseded or cancelled.
    fn fire(&mut self, kind: TimerKind, generation: u64) -> bool {
        if self.armed.get(&kind) == Some(&generation) {
            self.armed.remove(&kind);
            true
        } else {
            log::trace!("ignoring stale {kind:?} timer #{generation}");
            false
        }
    }
}

struct Runtime {
    session: Session,
    timers: Timers,
    pending_search: Option<SearchRequest>,
    tx: mpsc::Sender<Event>,
}

impl Runtime {
    fn run(mut self, rx: mpsc::Receiver<Event>) {
        if self.session.mark_indexing() {
            self.timers.arm(TimerKind::Indexing);
        }
        self.sync_timer();

        log::debug!("runtime started");
        while let Ok(event) = rx.recv() {
            match event {
                Event::Command(command, reply_tx) => {
                    let reply = self.handle_command(command);
                    // caller may have given up waiting
                    let _ = reply_tx.send(reply);
                }
                Event::Timer(kind, generation) => {
                    if self.timers.fire(kind, generation) {
                        self.handle_timer(kind);
                    }
                }
                Event::SearchCompleted(outcome) => {
                    self.session.complete_search(outcome);
                }
                Event::Shutdown => break,
            }
        }
        log::debug!("runtime stopped");
    }

    fn handle_command(&mut self, command: Command) -> Reply {
        let reply = match command {
            Command::Status => Reply::Status(self.session.status()),
            Command::Albums => Reply::Albums(self.session.albums()),
            Command::Results => Reply::Results(self.session.results()),
            Command::ToggleAlbum(name) => Reply::Selected(self.session.toggle_album(&name)),
            Command::SelectAllAlbums => {
                self.session.select_all_albums();
                Reply::Done
            }
            Command::UnselectAllAlbums => {
                self.session.unselect_all_albums();
                Reply::Done
            }
            Command::StartSync => {
                self.session.start_sync();
                Reply::Done
            }
            Command::PauseSync => {
                self.session.pause_sync();
                Reply::Done
            }
            Command::ToggleSync => {
                self.session.toggle_sync();
                Reply::Done
            }
            Command::SetQuery(text) => {
                let request = self.session.set_query(&text);
                self.schedule_search(request);
                Reply::Done
            }
            Command::SetMode(mode) => {
                let request = self.session.set_mode(mode);
                self.schedule_search(request);
                Reply::Done
            }
            Command::AddLocalPhotos(photos) => {
                let added = self.session.add_local_photos(photos);
                if added > 0 && self.session.mark_indexing() {
                    self.timers.arm(TimerKind::Indexing);
                }
                Reply::Added(added)
            }
        };

        self.sync_timer();
        reply
    }

    fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::SyncTick => {
                let report = self.session.sync_tick();
                log::debug!("sync tick: {}", report.current_action);
                self.sync_timer();
            }
            TimerKind::Indexing => {
                let report = self.session.index_pending();
                if report.indexed > 0 && !self.session.query().trim().is_empty() {
                    let mut request = self.session.refresh_search();
                    if let Some(pending) = self.pending_search {
                        request.learn |= pending.learn;
                    }
                    self.schedule_search(request);
                }
            }
            TimerKind::SearchDebounce => {
                let Some(request) = self.pending_search.take() else {
                    return;
                };
                let Some(plan) = self.session.begin_search(request) else {
                    return;
                };

                let expanders = self.session.expanders();
                let tx = self.tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("search-{}", Eid::new()))
                    .spawn(move || {
                        let outcome = plan.execute(&expanders);
                        let _ = tx.send(Event::SearchCompleted(outcome));
                    });

                if let Err(err) = spawned {
                    log::error!("failed to start search worker: {err}");
                }
            }
        }
    }

    fn schedule_search(&mut self, request: SearchRequest) {
        self.pending_search = Some(request);
        self.timers.arm(TimerKind::SearchDebounce);
    }

    /// Keeps the sync tick armed exactly while syncing.
    fn sync_timer(&mut self) {
        let armed = self.timers.is_armed(TimerKind::SyncTick);
        if self.session.is_syncing() && !armed {
            self.timers.arm(TimerKind::SyncTick);
        } else if !self.session.is_syncing() && armed {
            self.timers.cancel(TimerKind::SyncTick);
        }
    }
}

/// Starts the runtime thread and returns a handle to it.
pub fn spawn(session: Session, config: RuntimeConfig) -> SessionHandle {
    let (tx, rx) = mpsc::channel::<Event>();

    let runtime = Runtime {
        session,
        timers: Timers {
            tx: tx.clone(),
            config,
            armed: HashMap::new(),
            next_generation: 0,
        },
        pending_search: None,
        tx: tx.clone(),
    };

    let handle = std::thread::spawn(move || runtime.run(rx));

    SessionHandle {
        tx,
        join_handle: Arc::new(Mutex::new(Some(handle))),
    }
}

/// Cloneable client of the runtime.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Event>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    fn call(&self, command: Command) -> Result<Reply, AppError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Event::Command(command, reply_tx))
            .map_err(|_| AppError::Shutdown)?;
        reply_rx.recv().map_err(|_| AppError::Shutdown)
    }

    fn done(&self, command: Command) -> Result<(), AppError> {
        match self.call(command)? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn status(&self) -> Result<SyncStatus, AppError> {
        match self.call(Command::Status)? {
            Reply::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub fn albums(&self) -> Result<Vec<Album>, AppError> {
        match self.call(Command::Albums)? {
            Reply::Albums(albums) => Ok(albums),
            other => Err(unexpected(other)),
        }
    }

    pub fn results(&self) -> Result<SearchResults, AppError> {
        match self.call(Command::Results)? {
            Reply::Results(results) => Ok(results),
            other => Err(unexpected(other)),
        }
    }

    /// Returns whether the album is selected afterwards.
    pub fn toggle_album(&self, name: &str) -> Result<bool, AppError> {
        match self.call(Command::ToggleAlbum(name.to_string()))? {
            Reply::Selected(selected) => Ok(selected),
            other => Err(unexpected(other)),
        }
    }

    pub fn select_all_albums(&self) -> Result<(), AppError> {
        self.done(Command::SelectAllAlbums)
    }

    pub fn unselect_all_albums(&self) -> Result<(), AppError> {
        self.done(Command::UnselectAllAlbums)
    }

    pub fn start_sync(&self) -> Result<(), AppError> {
        self.done(Command::StartSync)
    }

    pub fn pause_sync(&self) -> Result<(), AppError> {
        self.done(Command::PauseSync)
    }

    pub fn toggle_sync(&self) -> Result<(), AppError> {
        self.done(Command::ToggleSync)
    }

    pub fn set_query(&self, text: &str) -> Result<(), AppError> {
        self.done(Command::SetQuery(text.to_string()))
    }

    pub fn set_mode(&self, mode: SearchMode) -> Result<(), AppError> {
        self.done(Command::SetMode(mode))
    }

    pub fn add_local_photos(&self, photos: Vec<Photo>) -> Result<usize, AppError> {
        match self.call(Command::AddLocalPhotos(photos))? {
            Reply::Added(added) => Ok(added),
            other => Err(unexpected(other)),
        }
    }

    /// Stops the runtime and waits for it. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown);

        let handle = self
            .join_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            log::warn!("waiting for runtime to stop");
            if let Err(err) = handle.join() {
                log::error!("runtime panicked: {err:?}");
            }
        }
    }
}

fn unexpected(reply: Reply) -> AppError {
    AppError::Other(anyhow!("unexpected reply from runtime: {reply:?}"))
}
