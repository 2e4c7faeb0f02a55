use crate::components::automation::AutomationState;
use crate::components::calendar::Provider;
use crate::error::{store_error, SyncResult};
use redis::{AsyncCommands, Client as RedisClient};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

// Store key constants
pub mod keys {
    use crate::components::calendar::Provider;

    pub const GOOGLE_CALENDAR_TOKEN: &str = "google_calendar_token";
    pub const MICROSOFT_CALENDAR_TOKEN: &str = "microsoft_calendar_token";
    pub const AUTOMATION_STATE: &str = "automation_state";

    /// Key holding the selected calendar ids of a provider
    pub fn selected_calendars(provider: Provider) -> String {
        format!("{}_selected_calendars", provider.key())
    }
}

/// Where the values live
enum Backend {
    Redis(RedisClient),
    File(PathBuf),
    Memory(HashMap<String, String>),
}

impl Backend {
    fn open(url: &str) -> SyncResult<Self> {
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            let client = RedisClient::open(url)
                .map_err(|e| store_error(&format!("Failed to create Redis client: {}", e)))?;
            Ok(Backend::Redis(client))
        } else if url == "memory://" {
            Ok(Backend::Memory(HashMap::new()))
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            if path.is_empty() {
                return Err(store_error("Empty store path"));
            }
            Ok(Backend::File(PathBuf::from(path)))
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Backend::Redis(_) => "redis",
            Backend::File(_) => "file",
            Backend::Memory(_) => "memory",
        }
    }
}

/// The store actor that processes messages
pub struct StoreActor {
    backend: Backend,
    command_rx: mpsc::Receiver<StoreCommand>,
}

/// Commands that can be sent to the store actor
pub enum StoreCommand {
    Get(String, mpsc::Sender<SyncResult<Option<String>>>),
    Set(String, String, mpsc::Sender<SyncResult<()>>),
    Delete(String, mpsc::Sender<SyncResult<()>>),
    Shutdown,
}

/// Handle for communicating with the store actor
#[derive(Clone)]
pub struct StoreHandle {
    command_tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Create a handle with no actor behind it; every call fails
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    /// Read a raw value
    pub async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Get(key.to_string(), response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Write a raw value
    pub async fn set(&self, key: &str, value: String) -> SyncResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Set(key.to_string(), value, response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Remove a value; removing a missing key is not an error
    pub async fn delete(&self, key: &str) -> SyncResult<()> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(StoreCommand::Delete(key.to_string(), response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> SyncResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| store_error(&format!("Failed to deserialize '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> SyncResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| store_error(&format!("Failed to serialize '{}': {}", key, e)))?;
        self.set(key, raw).await
    }

    /// Get an OAuth token
    pub async fn get_token(&self, key: &str) -> SyncResult<Option<Value>> {
        self.get_json(key).await
    }

    /// Save an OAuth token
    pub async fn save_token(&self, key: &str, token: &Value) -> SyncResult<()> {
        self.set_json(key, token).await
    }

    /// Forget an OAuth token
    pub async fn delete_token(&self, key: &str) -> SyncResult<()> {
        self.delete(key).await
    }

    /// Calendar ids the user picked for a provider, if any
    pub async fn get_selected_calendars(&self, provider: Provider) -> SyncResult<Option<Vec<String>>> {
        self.get_json(&keys::selected_calendars(provider)).await
    }

    /// Persist the calendar selection for a provider
    pub async fn save_selected_calendars(&self, provider: Provider, ids: &[String]) -> SyncResult<()> {
        self.set_json(&keys::selected_calendars(provider), &ids).await
    }

    /// Last automation state
    pub async fn get_automation_state(&self) -> SyncResult<Option<AutomationState>> {
        self.get_json(keys::AUTOMATION_STATE).await
    }

    /// Persist the automation state
    pub async fn save_automation_state(&self, state: &AutomationState) -> SyncResult<()> {
        self.set_json(keys::AUTOMATION_STATE, state).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(StoreCommand::Shutdown).await;
        Ok(())
    }
}

impl StoreActor {
    /// Create a new actor and return its handle
    pub fn new(url: &str) -> SyncResult<(Self, StoreHandle)> {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            backend: Backend::open(url)?,
            command_rx,
        };

        let handle = StoreHandle { command_tx };

        Ok((actor, handle))
    }

    /// Create the actor and spawn it on the runtime
    pub fn spawn(url: &str) -> SyncResult<StoreHandle> {
        let (mut actor, handle) = Self::new(url)?;
        tokio::spawn(async move {
            actor.run().await;
        });
        Ok(handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Store actor started ({} backend)", self.backend.describe());

        // Process commands
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                StoreCommand::Get(key, response_tx) => {
                    let result = self.read(&key).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Set(key, value, response_tx) => {
                    let result = self.write(&key, Some(value)).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Delete(key, response_tx) => {
                    let result = self.write(&key, None).await;
                    let _ = response_tx.send(result).await;
                }
                StoreCommand::Shutdown => {
                    info!("Store actor shutting down");
                    break;
                }
            }
        }

        info!("Store actor shut down");
    }

    async fn read(&self, key: &str) -> SyncResult<Option<String>> {
        match &self.backend {
            Backend::Redis(client) => {
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))?;
                let value: Option<String> = conn
                    .get(key)
                    .await
                    .map_err(|e| store_error(&format!("Failed to read '{}' from Redis: {}", key, e)))?;
                Ok(value)
            }
            Backend::File(path) => {
                let path = path.clone();
                let key = key.to_string();
                on_blocking_pool(move || Ok(read_file(&path)?.remove(&key))).await
            }
            Backend::Memory(map) => Ok(map.get(key).cloned()),
        }
    }

    async fn write(&mut self, key: &str, value: Option<String>) -> SyncResult<()> {
        debug!("Store write: {} ({})", key, if value.is_some() { "set" } else { "delete" });
        match &mut self.backend {
            Backend::Redis(client) => {
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))?;
                match value {
                    Some(value) => {
                        () = conn.set(key, value).await.map_err(|e| {
                            store_error(&format!("Failed to save '{}' to Redis: {}", key, e))
                        })?
                    }
                    None => {
                        () = conn.del(key).await.map_err(|e| {
                            store_error(&format!("Failed to delete '{}' from Redis: {}", key, e))
                        })?
                    }
                }
                Ok(())
            }
            Backend::File(path) => {
                let path = path.clone();
                let key = key.to_string();
                on_blocking_pool(move || {
                    let mut entries = read_file(&path)?;
                    match value {
                        Some(value) => {
                            entries.insert(key, value);
                        }
                        None => {
                            entries.remove(&key);
                        }
                    }
                    write_file(&path, &entries)
                })
                .await
            }
            Backend::Memory(map) => {
                match value {
                    Some(value) => {
                        map.insert(key.to_string(), value);
                    }
                    None => {
                        map.remove(key);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Run file I/O off the async workers
async fn on_blocking_pool<T, F>(task: F) -> SyncResult<T>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| store_error(&format!("Store file task failed: {}", e)))?
}

fn read_file(path: &Path) -> SyncResult<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| store_error(&format!("Corrupt store file {}: {}", path.display(), e)))
}

/// Replace the file through a sibling temp file so a crash never leaves it
/// half written
fn write_file(path: &Path, entries: &HashMap<String, String>) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        // Tokens live here
        options.mode(0o600);
    }

    {
        use std::io::Write;
        let mut file = options.open(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    Ok(())
}
