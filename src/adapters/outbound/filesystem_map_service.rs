use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

use crate::common::{DomainError, DomainResult};
use crate::domains::navigation::acquisition::{CorrectionValue, MapIdentity, MapLayer, MapRequest};
use crate::domains::navigation::ports::MapService;
use crate::domains::navigation::types::Pose2D;

/// Map service backed by JSON files laid out as
/// `<base>/<location>/<layer>.json`, `<base>/<location>/correction.json`
/// and `<base>/<location>/position.json`.
pub struct FilesystemMapService {
    base: PathBuf,
    location: String,
}

impl FilesystemMapService {
    pub fn new(base: Option<PathBuf>, location: &str) -> Self {
        let base = base.unwrap_or_else(|| {
            if let Ok(v) = env::var("NAVI_MAP_DATA_DIR") {
                PathBuf::from(v)
            } else {
                let cwd_default = Path::new("resources/maps");
                if cwd_default.exists() {
                    cwd_default.to_path_buf()
                } else {
                    PathBuf::from("/usr/share/navi-coordinator/maps")
                }
            }
        });
        Self { base, location: location.to_string() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, location: &str, file: &str) -> PathBuf {
        self.base.join(location).join(file)
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> DomainResult<T> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| DomainError::MapService {
            reason: format!("{}: {}", path.display(), e),
        })?;
        serde_json::from_str(&raw).map_err(|e| DomainError::MapService {
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

#[async_trait]
impl MapService for FilesystemMapService {
    async fn fetch_layer(&self, request: &MapRequest) -> DomainResult<MapLayer> {
        let path = self.path_for(&request.location, &format!("{}.json", request.layer.name()));
        let layer: MapLayer = self.read_json(&path).await?;
        if layer.layer != request.layer {
            return Err(DomainError::MapService {
                reason: format!("{} holds {} instead of {}", path.display(), layer.layer.name(), request.layer.name()),
            });
        }
        match &request.revision {
            Some(wanted) if !request.latest && wanted != &layer.revision => Err(DomainError::MapService {
                reason: format!("{} revision {} is not available (have {})", request.layer.name(), wanted, layer.revision),
            }),
            _ => Ok(layer),
        }
    }

    async fn fetch_correction(&self, source: &MapIdentity, target: &MapIdentity) -> DomainResult<CorrectionValue> {
        tracing::debug!("Reading correction {} ({:?}) -> {}", source.name, source.revision, target.name);
        self.read_json(&self.path_for(&self.location, "correction.json")).await
    }

    async fn fetch_position(&self) -> DomainResult<Pose2D> {
        self.read_json(&self.path_for(&self.location, "position.json")).await
    }
}
