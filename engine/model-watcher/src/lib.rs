//! Current-evaluator slot and checkpoint hot reload
//!
//! [`ModelSlot`] holds the evaluator every new self-play episode binds to.
//! Publishing swaps an `Arc`, so workers in the middle of an episode keep the
//! snapshot they started with and never observe a half-updated model.
//!
//! [`ModelWatcher`] republishes the slot whenever the `latest` checkpoint
//! file changes on disk. It uses both inotify (fast when events propagate)
//! and a polling fallback that compares modification times, because file
//! events are not delivered reliably on every filesystem (bind mounts,
//! network shares).
//!
//! # Example
//!
//! ```ignore
//! use model_watcher::{ModelSlot, ModelWatcher};
//! use std::sync::Arc;
//!
//! let slot = Arc::new(ModelSlot::new(Arc::new(mcts::UniformEvaluator)));
//! let loader = Arc::new(|path: &std::path::Path| load_checkpoint(path));
//! let watcher = ModelWatcher::new("./trained_models", "latest", slot.clone(), loader);
//!
//! watcher.try_load_existing()?;
//! let mut rx = watcher.start_watching().await?;
//! while let Some(version) = rx.recv().await {
//!     println!("Model version {} published", version);
//! }
//! ```

use anyhow::{anyhow, Result};
use engine_core::Game;
use mcts::Evaluator;
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default polling interval for checking model file changes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct Published<G: Game> {
    version: u64,
    evaluator: Arc<dyn Evaluator<G>>,
}

/// Atomically published "current evaluator".
///
/// The version starts at 0 for the initial evaluator and increases by one
/// with every [`publish`](ModelSlot::publish).
pub struct ModelSlot<G: Game> {
    current: RwLock<Published<G>>,
}

impl<G: Game> ModelSlot<G> {
    pub fn new(initial: Arc<dyn Evaluator<G>>) -> Self {
        Self {
            current: RwLock::new(Published {
                version: 0,
                evaluator: initial,
            }),
        }
    }

    /// Read-only snapshot of the current evaluator.
    pub fn snapshot(&self) -> Arc<dyn Evaluator<G>> {
        self.snapshot_with_version().1
    }

    /// Snapshot together with the version it was published as.
    pub fn snapshot_with_version(&self) -> (u64, Arc<dyn Evaluator<G>>) {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        (guard.version, Arc::clone(&guard.evaluator))
    }

    /// Replace the current evaluator. Returns the new version.
    pub fn publish(&self, evaluator: Arc<dyn Evaluator<G>>) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.version += 1;
        guard.evaluator = evaluator;
        guard.version
    }

    pub fn version(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .version
    }
}

/// Builds an evaluator from a checkpoint file.
pub type ModelLoader<G> = Arc<dyn Fn(&Path) -> Result<Arc<dyn Evaluator<G>>> + Send + Sync>;

/// Watches the `latest` checkpoint and republishes the slot when it changes.
pub struct ModelWatcher<G: Game> {
    /// Directory holding the checkpoints
    model_dir: PathBuf,
    /// Alias file name (e.g. "latest")
    model_filename: String,
    /// Slot updated on reload
    slot: Arc<ModelSlot<G>>,
    loader: ModelLoader<G>,
    /// Last known modification time of the loaded file.
    /// Used by polling to detect changes.
    last_mtime: Arc<RwLock<Option<SystemTime>>>,
    poll_interval: Duration,
}

impl<G: Game> ModelWatcher<G> {
    /// Create a new model watcher.
    ///
    /// # Arguments
    /// * `model_dir` - Directory to watch
    /// * `model_filename` - Alias file name to watch (e.g., "latest")
    /// * `slot` - Slot to publish reloaded evaluators into
    /// * `loader` - Turns a checkpoint file into an evaluator
    pub fn new(
        model_dir: impl AsRef<Path>,
        model_filename: impl Into<String>,
        slot: Arc<ModelSlot<G>>,
        loader: ModelLoader<G>,
    ) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            model_filename: model_filename.into(),
            slot,
            loader,
            last_mtime: Arc::new(RwLock::new(None)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set a custom polling interval (default 5 seconds).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the full path to the watched file.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_filename)
    }

    /// Try to load the model if it exists.
    ///
    /// Returns `Ok(true)` if a model was published, `Ok(false)` if no model exists.
    pub fn try_load_existing(&self) -> Result<bool> {
        let path = self.model_path();
        if path.exists() {
            info!("Found existing model at {:?}", path);
            Self::load_model_static(&path, &self.loader, &self.slot, &self.last_mtime)?;
            Ok(true)
        } else {
            debug!("No existing model at {:?}", path);
            Ok(false)
        }
    }

    /// Start watching for model changes.
    ///
    /// Spawns an inotify task and a polling task. Returns a channel that
    /// receives the slot version each time a new model is published.
    pub async fn start_watching(&self) -> Result<mpsc::Receiver<u64>> {
        let (tx, rx) = mpsc::channel(16);
        let model_dir = self.model_dir.clone();
        let model_filename = self.model_filename.clone();

        let (fs_tx, mut fs_rx) = mpsc::channel(100);

        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = fs_tx.blocking_send(event);
            }
            Err(e) => {
                warn!("File watcher error: {}", e);
            }
        })
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        if !model_dir.exists() {
            std::fs::create_dir_all(&model_dir)
                .map_err(|e| anyhow!("Failed to create model directory: {}", e))?;
        }

        watcher
            .watch(&model_dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch directory: {}", e))?;

        info!("Started watching {:?} for model updates", model_dir);

        let inotify_tx = tx.clone();
        let inotify_path = model_dir.join(&model_filename);
        let inotify_loader = Arc::clone(&self.loader);
        let inotify_slot = Arc::clone(&self.slot);
        let inotify_last_mtime = Arc::clone(&self.last_mtime);

        tokio::spawn(async move {
            // Keep watcher alive in this task
            let _watcher = watcher;

            let debounce_duration = Duration::from_millis(500);
            let mut last_reload = std::time::Instant::now() - debounce_duration;

            while let Some(event) = fs_rx.recv().await {
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {}
                    _ => continue,
                }

                // The alias is replaced by rename, so match on file name only
                let is_our_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == inotify_path.file_name());
                if !is_our_file {
                    continue;
                }

                if last_reload.elapsed() < debounce_duration {
                    debug!("Debouncing model reload event (inotify)");
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                if !inotify_path.exists() {
                    debug!("Model file doesn't exist yet");
                    continue;
                }

                info!("Model file changed (inotify), reloading {:?}", inotify_path);
                match Self::load_model_static(
                    &inotify_path,
                    &inotify_loader,
                    &inotify_slot,
                    &inotify_last_mtime,
                ) {
                    Ok(version) => {
                        last_reload = std::time::Instant::now();
                        let _ = inotify_tx.send(version).await;
                    }
                    Err(e) => {
                        error!("Failed to reload model (inotify): {}", e);
                    }
                }
            }
        });

        let poll_path = model_dir.join(&model_filename);
        let poll_loader = Arc::clone(&self.loader);
        let poll_slot = Arc::clone(&self.slot);
        let poll_last_mtime = Arc::clone(&self.last_mtime);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            info!(
                "Started polling fallback for model updates (interval: {:?})",
                poll_interval
            );

            let mut interval = tokio::time::interval(poll_interval);
            // Don't fire immediately - let inotify have first chance
            interval.tick().await;

            loop {
                interval.tick().await;

                let current_mtime = match poll_path.metadata().and_then(|m| m.modified()) {
                    Ok(mtime) => mtime,
                    Err(_) => {
                        debug!("Polling: model file doesn't exist yet");
                        continue;
                    }
                };

                let needs_reload = {
                    let last = poll_last_mtime.read().ok();
                    match last.as_deref() {
                        Some(Some(last_time)) => current_mtime > *last_time,
                        Some(None) => true,
                        None => {
                            warn!("Polling: failed to read last_mtime lock");
                            continue;
                        }
                    }
                };

                if !needs_reload {
                    continue;
                }

                tokio::time::sleep(Duration::from_millis(100)).await;

                info!("Model file changed (polling), reloading {:?}", poll_path);
                match Self::load_model_static(&poll_path, &poll_loader, &poll_slot, &poll_last_mtime)
                {
                    Ok(version) => {
                        if tx.send(version).await.is_err() {
                            debug!("Model update receiver dropped, stopping poller");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to reload model (polling): {}", e);
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Load `path`, publish it, and remember its modification time.
    fn load_model_static(
        path: &Path,
        loader: &ModelLoader<G>,
        slot: &ModelSlot<G>,
        last_mtime: &RwLock<Option<SystemTime>>,
    ) -> Result<u64> {
        let file_mtime = path.metadata().and_then(|m| m.modified()).ok();

        let evaluator = loader(path)
            .map_err(|e| anyhow!("Failed to load model from {:?}: {}", path, e))?;
        let version = slot.publish(evaluator);

        {
            let mut mtime_guard = last_mtime
                .write()
                .map_err(|e| anyhow!("Failed to acquire last_mtime write lock: {}", e))?;
            *mtime_guard = file_mtime;
        }

        info!(version, "Model loaded successfully from {:?}", path);
        Ok(version)
    }
}
