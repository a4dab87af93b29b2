//! Bounded acquisition of layer maps, pose correction and the initial pose.
//!
//! Every fetch is polled against a deadline; callers decide which degraded
//! default to fall back to when an `AcquisitionTimeout` comes back.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::costmap::MapMetadata;
use super::ports::MapService;
use super::types::Pose2D;
use crate::common::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapLayerKind {
    StaticLayer,
    SemiStaticLayer,
    ExclusionZoneLayer,
}

impl MapLayerKind {
    /// Request order.
    pub const ALL: [MapLayerKind; 3] = [
        MapLayerKind::StaticLayer,
        MapLayerKind::SemiStaticLayer,
        MapLayerKind::ExclusionZoneLayer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MapLayerKind::StaticLayer => "static_layer",
            MapLayerKind::SemiStaticLayer => "semi_static_layer",
            MapLayerKind::ExclusionZoneLayer => "exclusion_zone_layer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapSpace {
    Real,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
    pub layer: MapLayerKind,
    pub revision: Option<String>,
    pub latest: bool,
    pub location: String,
    pub space: MapSpace,
}

impl MapRequest {
    /// The exclusion zone layer always comes from the latest real-space map of
    /// the location; the other layers follow the commanded revision.
    pub fn for_layer(layer: MapLayerKind, revision: Option<&str>, location: &str) -> Self {
        match layer {
            MapLayerKind::ExclusionZoneLayer => Self {
                layer,
                revision: None,
                latest: true,
                location: location.to_string(),
                space: MapSpace::Real,
            },
            _ => Self {
                layer,
                revision: revision.map(str::to_string),
                latest: revision.is_none(),
                location: location.to_string(),
                space: MapSpace::Real,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub layer: MapLayerKind,
    pub revision: String,
    #[serde(default)]
    pub metadata: Option<MapMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapIdentity {
    pub name: String,
    pub space: MapSpace,
    /// `None` asks for whatever revision the repository holds.
    #[serde(default)]
    pub revision: Option<String>,
}

impl MapIdentity {
    /// The environment map at `revision`, or its current revision when `None`.
    pub fn environment(revision: Option<&str>) -> Self {
        Self {
            name: "environment".to_string(),
            space: MapSpace::Virtual,
            revision: revision.map(str::to_string),
        }
    }

    /// The reference map is fixed, so it never carries a revision.
    pub fn reference() -> Self {
        Self { name: "reference".to_string(), space: MapSpace::Virtual, revision: None }
    }
}

/// Offset between two map frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrectionValue {
    pub dx: f64,
    pub dy: f64,
    pub dyaw: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerMapCache {
    static_loaded: bool,
    semi_static_loaded: bool,
    exclusion_zone_loaded: bool,
    revision: Option<String>,
    static_metadata: Option<MapMetadata>,
}

impl LayerMapCache {
    pub fn mark_stale(&mut self) {
        self.static_loaded = false;
        self.semi_static_loaded = false;
        self.exclusion_zone_loaded = false;
    }

    pub fn mark_loaded(&mut self, layer: &MapLayer) {
        match layer.layer {
            MapLayerKind::StaticLayer => {
                self.static_loaded = true;
                if layer.metadata.is_some() {
                    self.static_metadata = layer.metadata.clone();
                }
            }
            MapLayerKind::SemiStaticLayer => self.semi_static_loaded = true,
            MapLayerKind::ExclusionZoneLayer => self.exclusion_zone_loaded = true,
        }
        self.revision = Some(layer.revision.clone());
    }

    pub fn is_loaded(&self, layer: MapLayerKind) -> bool {
        match layer {
            MapLayerKind::StaticLayer => self.static_loaded,
            MapLayerKind::SemiStaticLayer => self.semi_static_loaded,
            MapLayerKind::ExclusionZoneLayer => self.exclusion_zone_loaded,
        }
    }

    pub fn is_complete(&self) -> bool {
        MapLayerKind::ALL.iter().all(|l| self.is_loaded(*l))
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Grid header of the last static layer that carried one.
    pub fn static_metadata(&self) -> Option<&MapMetadata> {
        self.static_metadata.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionPolicy {
    pub location: String,
    pub retry_interval: Duration,
    pub map_timeout: Duration,
    pub correction_timeout: Duration,
    pub pose_timeout: Duration,
}

/// Repeats `attempt` until it succeeds or `timeout` elapses. Failed attempts
/// are retried every `retry_interval`; a hanging attempt is cut off at the deadline.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    retry_interval: Duration,
    mut attempt: F,
) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let deadline = Instant::now() + timeout;
    let timed_out = || DomainError::AcquisitionTimeout { what: what.to_string(), timeout };
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        match tokio::time::timeout(remaining, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!("{} request failed, retrying: {}", what, e);
                tokio::time::sleep_until((Instant::now() + retry_interval).min(deadline)).await;
            }
            Err(_) => return Err(timed_out()),
        }
    }
}

/// Loads every layer in order under one shared deadline, then the correction
/// between the environment and reference maps.
pub async fn acquire_layer_maps(
    maps: &dyn MapService,
    cache: &mut LayerMapCache,
    revision: Option<&str>,
    policy: &AcquisitionPolicy,
) -> DomainResult<CorrectionValue> {
    let deadline = Instant::now() + policy.map_timeout;
    cache.mark_stale();

    for kind in MapLayerKind::ALL {
        let request = MapRequest::for_layer(kind, revision, &policy.location);
        let request = &request;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let layer = poll_until(kind.name(), remaining, policy.retry_interval, move || {
            maps.fetch_layer(request)
        })
        .await?;
        debug!("Loaded {} revision {}", kind.name(), layer.revision);
        cache.mark_loaded(&layer);
    }

    let source = MapIdentity::environment(revision);
    let target = MapIdentity::reference();
    let (source, target) = (&source, &target);
    let correction = poll_until("correction value", policy.correction_timeout, policy.retry_interval, move || {
        maps.fetch_correction(source, target)
    })
    .await?;
    info!(
        "Layer maps loaded (revision {:?}), correction dx={:.3} dy={:.3} dyaw={:.4}",
        cache.revision(),
        correction.dx,
        correction.dy,
        correction.dyaw
    );
    Ok(correction)
}

pub async fn acquire_initial_pose(maps: &dyn MapService, policy: &AcquisitionPolicy) -> DomainResult<Pose2D> {
    poll_until("initial pose", policy.pose_timeout, policy.retry_interval, move || maps.fetch_position()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until("probe", Duration::from_secs(10), Duration::from_secs(1), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DomainError::MapService { reason: "not ready".into() })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_gives_up_at_deadline() {
        let start = Instant::now();
        let result: DomainResult<()> = poll_until("probe", Duration::from_secs(5), Duration::from_secs(2), || async {
            Err(DomainError::MapService { reason: "down".into() })
        })
        .await;
        assert!(matches!(result, Err(DomainError::AcquisitionTimeout { .. })));
        assert!(Instant::now() - start <= Duration::from_secs(5) + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_cuts_off_hanging_request() {
        let result: DomainResult<()> = poll_until("probe", Duration::from_secs(3), Duration::from_secs(1), || {
            std::future::pending::<DomainResult<()>>()
        })
        .await;
        assert!(matches!(result, Err(DomainError::AcquisitionTimeout { .. })));
    }

    #[test]
    fn test_exclusion_layer_request_is_latest() {
        let r = MapRequest::for_layer(MapLayerKind::ExclusionZoneLayer, Some("12"), "lictia_1f");
        assert!(r.latest);
        assert_eq!(r.revision, None);
        let r = MapRequest::for_layer(MapLayerKind::StaticLayer, Some("12"), "lictia_1f");
        assert_eq!(r.revision.as_deref(), Some("12"));
        assert!(!r.latest);
    }

    #[test]
    fn test_cache_completion() {
        let mut cache = LayerMapCache::default();
        for kind in MapLayerKind::ALL {
            assert!(!cache.is_complete());
            cache.mark_loaded(&MapLayer { layer: kind, revision: "3".into(), metadata: None });
        }
        assert!(cache.is_complete());
        assert_eq!(cache.revision(), Some("3"));
        cache.mark_stale();
        assert!(!cache.is_complete());
    }

    #[test]
    fn test_static_layer_metadata_is_kept() {
        let mut cache = LayerMapCache::default();
        let metadata = MapMetadata { width: 4, height: 2, resolution: 0.1, ..Default::default() };
        cache.mark_loaded(&MapLayer {
            layer: MapLayerKind::StaticLayer,
            revision: "5".into(),
            metadata: Some(metadata.clone()),
        });
        cache.mark_loaded(&MapLayer { layer: MapLayerKind::SemiStaticLayer, revision: "5".into(), metadata: None });
        assert_eq!(cache.static_metadata(), Some(&metadata));
    }

    #[test]
    fn test_correction_source_carries_revision() {
        assert_eq!(MapIdentity::environment(Some("12")).revision.as_deref(), Some("12"));
        assert_eq!(MapIdentity::reference().revision, None);
    }
}
