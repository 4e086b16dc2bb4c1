//! File exchange with the terminal.
//!
//! A file travels as three kinds of telegrams: its path on FILE_PATH, its
//! length in bytes as decimal text on FILE_LENGTH, and its content on
//! FILE_CHUNK split into as many telegrams as needed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use termlink_connection::{Channel, Connection, ConnectionConfig, ConnectionError, ControlRequest};
use tracing::{debug, info, warn};

use crate::error::{RemoteError, Result};

/// Extensions the terminal sends when automatic exchange is switched on.
pub const DEFAULT_FILE_EXTENSIONS: &str = "*.ism*.isc*.isw";

/// Connection name used by [`FileExchange::open`] callers that have no preference.
pub const DEFAULT_CONNECTION_NAME: &str = "FileExchange";

/// A file received from the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// File name without directories.
    pub name: String,
    /// Path on the terminal.
    pub path: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct FileExchangeConfig {
    pub connection: ConnectionConfig,
    /// How long the worker waits for a file before checking whether it should stop.
    pub poll_interval: Duration,
    /// Pause after switching automatic exchange off, for files already in flight.
    pub drain_interval: Duration,
    /// Timeout for control replies and for the remainder of a file once its
    /// path has arrived. `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

impl Default for FileExchangeConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            poll_interval: Duration::from_secs(1),
            drain_interval: Duration::from_secs(1),
            reply_timeout: None,
        }
    }
}

#[derive(Debug)]
struct ExchangeState {
    files_to_skip: Vec<String>,
    received: Vec<ReceivedFile>,
    keep_in_object: bool,
    save_directory: Option<PathBuf>,
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self {
            files_to_skip: vec!["lastshot.ism".to_string()],
            received: Vec::new(),
            keep_in_object: true,
            save_directory: None,
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// Receives files from the terminal over a dedicated connection.
pub struct FileExchange {
    connection: Arc<Connection>,
    name: String,
    config: FileExchangeConfig,
    state: Arc<Mutex<ExchangeState>>,
    worker: Mutex<Option<Worker>>,
}

impl FileExchange {
    /// Connect to the terminal at `address` under `connection_name`.
    pub fn open(address: &str, connection_name: &str) -> Result<Self> {
        Self::open_with_config(address, connection_name, FileExchangeConfig::default())
    }

    pub fn open_with_config(
        address: &str,
        connection_name: &str,
        config: FileExchangeConfig,
    ) -> Result<Self> {
        let connection = Connection::with_config(config.connection.clone());
        connection.connect(address, connection_name)?;
        Ok(Self::with_connection(connection, config))
    }

    /// Use a connection that is already registered with the terminal.
    pub fn with_connection(connection: Connection, config: FileExchangeConfig) -> Self {
        let name = connection.connection_name();
        Self {
            connection: Arc::new(connection),
            name,
            config,
            state: Arc::new(Mutex::new(ExchangeState::default())),
            worker: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn lock_state(&self) -> MutexGuard<'_, ExchangeState> {
        lock(&self.state)
    }

    /// Lock the worker slot, first reaping a worker that stopped on its own.
    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker
            .as_ref()
            .is_some_and(|worker| !worker.running.load(Ordering::Acquire))
        {
            if let Some(finished) = worker.take() {
                if finished.handle.join().is_err() {
                    warn!("file exchange worker panicked");
                }
                debug!("reaped stopped file exchange worker");
            }
        }
        worker
    }

    /// Whether the automatic exchange worker is running.
    pub fn is_automatic_exchange_active(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|worker| worker.running.load(Ordering::Acquire))
    }

    /// Request a single file from the terminal and wait for it.
    ///
    /// Not available while automatic exchange is on; the worker would
    /// compete for the same telegrams.
    pub fn acquire_file(&self, path: &str) -> Result<ReceivedFile> {
        if self.lock_worker().is_some() {
            return Err(RemoteError::FileExchangeActive);
        }

        let request = ControlRequest::AcquireFile {
            connection: &self.name,
            path,
        };
        self.connection
            .send(request.to_payload().as_bytes(), Channel::Control)?;

        let timeout = self.config.reply_timeout.unwrap_or(Duration::MAX);
        let file = receive_file(&self.connection, timeout, timeout)?.ok_or_else(|| {
            RemoteError::Connection(ConnectionError::Timeout {
                channel: Channel::FilePath,
                after: timeout,
            })
        })?;
        info!(name = %file.name, len = file.data.len(), "file acquired");
        Ok(file)
    }

    /// Ask the terminal to push every new file matching `extensions` and start
    /// collecting them in the background. Returns the terminal's reply.
    pub fn enable_automatic_file_exchange(&self, extensions: &str) -> Result<String> {
        let request = ControlRequest::AutomaticFileExchange {
            connection: &self.name,
            extensions: Some(extensions),
        };
        let reply = self.connection.send_string_and_wait_for_reply_string(
            &request.to_payload(),
            Channel::Control,
            Some(self.config.reply_timeout.unwrap_or(Duration::MAX)),
            Some(Channel::FileExchange),
        )?;

        let mut worker = self.lock_worker();
        if worker.is_none() {
            *worker = Some(self.start_worker()?);
            info!(extensions, "automatic file exchange enabled");
        }
        Ok(reply)
    }

    /// Switch automatic exchange off, let in-flight files arrive and stop the worker.
    pub fn disable_automatic_file_exchange(&self) -> Result<String> {
        let request = ControlRequest::AutomaticFileExchange {
            connection: &self.name,
            extensions: None,
        };
        let reply = self.connection.send_string_and_wait_for_reply_string(
            &request.to_payload(),
            Channel::Control,
            Some(self.config.reply_timeout.unwrap_or(Duration::MAX)),
            Some(Channel::FileExchange),
        );

        thread::sleep(self.config.drain_interval);
        self.stop_worker();
        info!("automatic file exchange disabled");
        reply.map_err(RemoteError::from)
    }

    fn start_worker(&self) -> Result<Worker> {
        let running = Arc::new(AtomicBool::new(true));
        let connection = Arc::clone(&self.connection);
        let state = Arc::clone(&self.state);
        let flag = Arc::clone(&running);
        let poll_interval = self.config.poll_interval;
        let transfer_timeout = self.config.reply_timeout.unwrap_or(Duration::MAX);

        let handle = thread::Builder::new()
            .name(format!("termlink-files-{}", self.name))
            .spawn(move || {
                receive_files(&connection, &state, &flag, poll_interval, transfer_timeout)
            })
            .map_err(RemoteError::Worker)?;

        Ok(Worker { handle, running })
    }

    fn stop_worker(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };
        worker.running.store(false, Ordering::Release);
        if worker.handle.join().is_err() {
            warn!("file exchange worker panicked");
        }
    }

    /// Never keep or save files with this name.
    pub fn append_files_to_skip(&self, name: impl Into<String>) {
        self.lock_state().files_to_skip.push(name.into());
    }

    /// Write every received file into `directory` as it arrives.
    pub fn enable_save_received_files_to_disk(&self, directory: impl Into<PathBuf>) {
        self.lock_state().save_directory = Some(directory.into());
    }

    pub fn disable_save_received_files_to_disk(&self) {
        self.lock_state().save_directory = None;
    }

    /// Keep received files in memory for [`received_files`](Self::received_files).
    pub fn enable_keep_received_files_in_object(&self, keep: bool) {
        self.lock_state().keep_in_object = keep;
    }

    pub fn received_files(&self) -> Vec<ReceivedFile> {
        self.lock_state().received.clone()
    }

    pub fn latest_received_file(&self) -> Option<ReceivedFile> {
        self.lock_state().received.last().cloned()
    }

    pub fn delete_received_files(&self) {
        self.lock_state().received.clear();
    }

    /// Write `file` into the save directory. Does nothing while saving is off.
    pub fn save_received_file(&self, file: &ReceivedFile) -> Result<()> {
        let directory = self.lock_state().save_directory.clone();
        match directory {
            Some(directory) => save_file(&directory, file).map(drop),
            None => Ok(()),
        }
    }

    /// Stop automatic exchange if it is on and disconnect.
    pub fn close(&self) -> Result<()> {
        if self.lock_worker().is_some() {
            if let Err(err) = self.disable_automatic_file_exchange() {
                debug!(error = %err, "disabling automatic exchange on close failed");
            }
        }
        self.connection.disconnect()?;
        Ok(())
    }
}

impl Drop for FileExchange {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

impl std::fmt::Debug for FileExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileExchange")
            .field("name", &self.name)
            .field("automatic", &self.is_automatic_exchange_active())
            .finish_non_exhaustive()
    }
}

fn lock(state: &Mutex<ExchangeState>) -> MutexGuard<'_, ExchangeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn receive_files(
    connection: &Connection,
    state: &Mutex<ExchangeState>,
    running: &AtomicBool,
    poll_interval: Duration,
    transfer_timeout: Duration,
) {
    while running.load(Ordering::Acquire) {
        match receive_file(connection, poll_interval, transfer_timeout) {
            Ok(Some(file)) => store_file(state, file),
            Ok(None) => {}
            Err(err) if err.is_connection_lost() => {
                warn!(error = %err, "connection lost, stopping file exchange");
                break;
            }
            Err(err) => warn!(error = %err, "failed to receive file"),
        }
    }
    running.store(false, Ordering::Release);
}

fn store_file(state: &Mutex<ExchangeState>, file: ReceivedFile) {
    let mut state = lock(state);
    if state.files_to_skip.iter().any(|skip| *skip == file.name) {
        debug!(name = %file.name, "skipping file");
        return;
    }

    info!(name = %file.name, len = file.data.len(), "file received");
    if let Some(directory) = &state.save_directory {
        if let Err(err) = save_file(directory, &file) {
            warn!(error = %err, "failed to save received file");
        }
    }
    if state.keep_in_object {
        state.received.push(file);
    }
}

/// Receive one file. `Ok(None)` when no file starts within `wait`.
fn receive_file(
    connection: &Connection,
    wait: Duration,
    transfer_timeout: Duration,
) -> Result<Option<ReceivedFile>> {
    let path = match connection.wait_for_string_telegram(Channel::FilePath, Some(wait)) {
        Ok(path) => path,
        Err(err) if err.is_timeout() => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let length = connection.wait_for_string_telegram(Channel::FileLength, Some(transfer_timeout))?;
    let expected: usize = length
        .trim()
        .parse()
        .map_err(|_| RemoteError::InvalidReply {
            request: format!("length of {path}"),
            reply: length.clone(),
        })?;

    let mut data = BytesMut::with_capacity(expected);
    while data.len() < expected {
        let chunk = connection.wait_for_telegram(Channel::FileChunk, Some(transfer_timeout))?;
        data.extend_from_slice(&chunk);
    }

    Ok(Some(ReceivedFile {
        name: file_name(&path).to_string(),
        path,
        data: data.freeze(),
    }))
}

/// Last component of a terminal path, which may use either separator.
fn file_name(path: &str) -> &str {
    path.rsplit(&['\\', '/'][..]).next().unwrap_or(path)
}

fn save_file(directory: &Path, file: &ReceivedFile) -> Result<PathBuf> {
    let target = directory.join(&file.name);
    std::fs::write(&target, &file.data).map_err(|source| RemoteError::Io {
        path: target.clone(),
        source,
    })?;
    debug!(path = %target.display(), "file saved");
    Ok(target)
}
