use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::Notify;

use crate::error::{AssetError, AssetResult};

/// Cancellation flag shared between a requester and an in-flight fetch.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`AbortSignal::abort`] has been called.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchAssetOptions {
    pub signal: Option<AbortSignal>,
    /// Relative URIs are resolved against this location.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub uri: String,
    pub data: Vec<u8>,
    pub media_type: Option<String>,
}

pub type AssetFuture<'a> = Pin<Box<dyn Future<Output = AssetResult<Asset>> + Send + 'a>>;

pub trait AssetFetcher: Send + Sync {
    fn fetch<'a>(&'a self, uri: &'a str, options: FetchAssetOptions) -> AssetFuture<'a>;
}

/// Reads plain paths and `file://` URIs from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn resolve(uri: &str, base_url: Option<&str>) -> AssetResult<PathBuf> {
        let path = match uri.split_once("://") {
            Some(("file", rest)) => PathBuf::from(rest),
            Some(_) => return Err(AssetError::UnsupportedScheme(uri.to_string())),
            None => PathBuf::from(uri),
        };
        if path.is_absolute() {
            return Ok(path);
        }
        let Some(base) = base_url else {
            return Ok(path);
        };
        let base = Self::resolve(base, None)?;
        // A base pointing at a file resolves relative to its directory
        let dir = if base.extension().is_some() {
            base.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            base
        };
        Ok(dir.join(path))
    }
}

fn media_type_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match extension.as_str() {
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "stl" => "model/stl",
        "dae" => "model/vnd.collada+xml",
        _ => return None,
    };
    Some(media_type.to_string())
}

impl AssetFetcher for FileFetcher {
    fn fetch<'a>(&'a self, uri: &'a str, options: FetchAssetOptions) -> AssetFuture<'a> {
        Box::pin(async move {
            let path = Self::resolve(uri, options.base_url.as_deref())?;
            let read = async {
                tokio::fs::read(&path).await.map_err(|err| AssetError::Io {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })
            };

            let data = match &options.signal {
                Some(signal) => {
                    if signal.is_aborted() {
                        return Err(AssetError::Aborted);
                    }
                    tokio::select! {
                        data = read => data?,
                        _ = signal.aborted() => return Err(AssetError::Aborted),
                    }
                }
                None => read.await?,
            };

            Ok(Asset {
                uri: uri.to_string(),
                media_type: media_type_for(&path),
                data,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_to_base() {
        assert_eq!(
            FileFetcher::resolve("meshes/arm.glb", Some("file:///robots/ur5/robot.urdf")).unwrap(),
            PathBuf::from("/robots/ur5/meshes/arm.glb")
        );
        assert_eq!(
            FileFetcher::resolve("file:///abs/model.glb", Some("/ignored")).unwrap(),
            PathBuf::from("/abs/model.glb")
        );
        assert!(matches!(
            FileFetcher::resolve("https://example.com/a.glb", None),
            Err(AssetError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn fetch_reads_files_and_honours_abort() {
        let path = std::env::temp_dir().join(format!("sceneview-fetch-{}.glb", std::process::id()));
        std::fs::write(&path, b"glTF").unwrap();
        let uri = path.display().to_string();

        let asset = FileFetcher
            .fetch(&uri, FetchAssetOptions::default())
            .await
            .unwrap();
        assert_eq!(asset.data, b"glTF");
        assert_eq!(asset.media_type.as_deref(), Some("model/gltf-binary"));

        let signal = AbortSignal::new();
        signal.abort();
        let options = FetchAssetOptions {
            signal: Some(signal),
            base_url: None,
        };
        assert!(matches!(
            FileFetcher.fetch(&uri, options).await,
            Err(AssetError::Aborted)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn missing_files_report_io_errors() {
        let result = FileFetcher
            .fetch("/definitely/not/here.glb", FetchAssetOptions::default())
            .await;
        assert!(matches!(result, Err(AssetError::Io { .. })));
    }
}
