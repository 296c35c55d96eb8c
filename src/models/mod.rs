pub mod fetch;
pub mod gltf_loader;

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, channel},
        Arc,
    },
};

use id_arena::{Arena, Id};

use crate::error::AssetError;

pub use fetch::{AbortSignal, Asset, AssetFetcher, FetchAssetOptions, FileFetcher};
pub use gltf_loader::LoadedModel;

pub type ModelId = Id<LoadedModel>;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEntry {
    Loading,
    Loaded(ModelId),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ModelLoadOptions {
    pub base_url: Option<String>,
    pub signal: Option<AbortSignal>,
    /// Inline model bytes. When present no fetch is issued.
    pub embedded_data: Option<Vec<u8>>,
}

/// A load that finished since the previous [`ModelCache::poll`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvent {
    pub url: String,
    pub entry: ModelEntry,
}

type LoadResult = (String, Result<LoadedModel, AssetError>);

/// Loads and caches models by URL. Fetching and decoding run on a background runtime; results
/// are picked up by `poll` at the start of a frame.
pub struct ModelCache {
    models: Arena<LoadedModel>,
    entries: HashMap<String, ModelEntry>,
    fetcher: Arc<dyn AssetFetcher>,
    runtime: Option<tokio::runtime::Runtime>,
    sender: mpsc::Sender<LoadResult>,
    receiver: mpsc::Receiver<LoadResult>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(Arc::new(FileFetcher))
    }
}

impl ModelCache {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        let (sender, receiver) = channel();
        Self {
            models: Arena::new(),
            entries: HashMap::new(),
            fetcher,
            runtime: None,
            sender,
            receiver,
        }
    }

    fn runtime(&mut self) -> Result<&tokio::runtime::Runtime, AssetError> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("model-loader")
                .enable_all()
                .build()
                .map_err(|err| AssetError::Runtime(err.to_string()))?;
            self.runtime = Some(runtime);
        }
        self.runtime
            .as_ref()
            .ok_or_else(|| AssetError::Runtime("runtime unavailable".into()))
    }

    /// Starts loading `url` unless it is already known. Returns the current entry.
    pub fn load(&mut self, url: &str, options: ModelLoadOptions) -> ModelEntry {
        if let Some(entry) = self.entries.get(url) {
            return entry.clone();
        }

        if let Some(bytes) = &options.embedded_data {
            let entry = match LoadedModel::from_gltf_bytes(url, bytes) {
                Ok(model) => ModelEntry::Loaded(self.models.alloc(model)),
                Err(err) => {
                    log::error!("Failed to load embedded model {url}: {err}");
                    ModelEntry::Failed(err.to_string())
                }
            };
            self.entries.insert(url.to_string(), entry.clone());
            return entry;
        }

        let fetcher = self.fetcher.clone();
        let sender = self.sender.clone();
        let task_url = url.to_string();
        let fetch_options = FetchAssetOptions {
            signal: options.signal,
            base_url: options.base_url,
        };
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(err) => {
                let entry = ModelEntry::Failed(err.to_string());
                self.entries.insert(url.to_string(), entry.clone());
                return entry;
            }
        };

        log::debug!("Loading model {url}");
        runtime.spawn(async move {
            let result = match fetcher.fetch(&task_url, fetch_options).await {
                Ok(asset) => {
                    let name = task_url.clone();
                    tokio::task::spawn_blocking(move || {
                        LoadedModel::from_gltf_bytes(name, &asset.data)
                    })
                    .await
                    .unwrap_or_else(|err| Err(AssetError::Runtime(err.to_string())))
                }
                Err(err) => Err(err),
            };
            // The cache may have been dropped in the meantime
            let _ = sender.send((task_url, result));
        });

        self.entries.insert(url.to_string(), ModelEntry::Loading);
        ModelEntry::Loading
    }

    /// Moves finished loads into the cache.
    pub fn poll(&mut self) -> Vec<ModelEvent> {
        let mut events = Vec::new();
        while let Ok((url, result)) = self.receiver.try_recv() {
            // Entries removed by `clear` while loading are dropped
            if self.entries.get(&url) != Some(&ModelEntry::Loading) {
                continue;
            }
            let entry = match result {
                Ok(model) => {
                    log::info!("Loaded model {url} ({} triangles)", model.triangle_count());
                    ModelEntry::Loaded(self.models.alloc(model))
                }
                Err(err) => {
                    log::error!("Failed to load model {url}: {err}");
                    ModelEntry::Failed(err.to_string())
                }
            };
            self.entries.insert(url.clone(), entry.clone());
            events.push(ModelEvent { url, entry });
        }
        events
    }

    /// Blocks until every pending load finished or `timeout` elapsed.
    pub fn wait_for_pending(&mut self, timeout: std::time::Duration) -> Vec<ModelEvent> {
        let deadline = std::time::Instant::now() + timeout;
        let mut events = Vec::new();
        while self.has_pending() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(result) => {
                    // Put it back through the regular path
                    let _ = self.sender.send(result);
                    events.extend(self.poll());
                }
                Err(_) => break,
            }
        }
        events
    }

    pub fn has_pending(&self) -> bool {
        self.entries
            .values()
            .any(|entry| *entry == ModelEntry::Loading)
    }

    pub fn entry(&self, url: &str) -> Option<&ModelEntry> {
        self.entries.get(url)
    }

    pub fn model(&self, id: ModelId) -> Option<&LoadedModel> {
        self.models.get(id)
    }

    /// Resolves `url` to its model if it has loaded.
    pub fn loaded(&self, url: &str) -> Option<&LoadedModel> {
        match self.entries.get(url)? {
            ModelEntry::Loaded(id) => self.models.get(*id),
            _ => None,
        }
    }

    /// Forgets every entry. Models stay allocated until the cache is dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::gltf_loader::test_support::triangle_glb;

    #[test]
    fn embedded_models_load_immediately() {
        let mut cache = ModelCache::default();
        let options = ModelLoadOptions {
            embedded_data: Some(triangle_glb()),
            ..Default::default()
        };
        let entry = cache.load("inline://triangle", options);
        assert!(matches!(entry, ModelEntry::Loaded(_)));
        assert_eq!(cache.loaded("inline://triangle").unwrap().triangle_count(), 1);
    }

    #[test]
    fn files_load_in_the_background() {
        let path = std::env::temp_dir().join(format!("sceneview-cache-{}.glb", std::process::id()));
        std::fs::write(&path, triangle_glb()).unwrap();
        let url = format!("file://{}", path.display());

        let mut cache = ModelCache::default();
        assert_eq!(cache.load(&url, ModelLoadOptions::default()), ModelEntry::Loading);
        assert_eq!(cache.load(&url, ModelLoadOptions::default()), ModelEntry::Loading);

        let events = cache.wait_for_pending(Duration::from_secs(10));
        std::fs::remove_file(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].entry, ModelEntry::Loaded(_)));
        assert!(cache.loaded(&url).is_some());
    }

    #[test]
    fn failed_loads_are_reported() {
        let mut cache = ModelCache::default();
        cache.load("/no/such/model.glb", ModelLoadOptions::default());
        let events = cache.wait_for_pending(Duration::from_secs(10));
        assert!(matches!(events[0].entry, ModelEntry::Failed(_)));

        cache.load("https://example.com/model.glb", ModelLoadOptions::default());
        cache.wait_for_pending(Duration::from_secs(10));
        assert!(matches!(
            cache.entry("https://example.com/model.glb"),
            Some(ModelEntry::Failed(message)) if message.contains("unsupported")
        ));
    }
}
