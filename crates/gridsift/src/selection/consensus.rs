//! Union consensus across vision models.
//!
//! Every configured model sees the same grid and prompt. The grid's result is
//! the union of every model's validated picks, so a photo survives if any one
//! model wants it. A failing model contributes nothing and never fails the
//! grid.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use super::parser::{extract_coordinates, validate_coordinates};
use crate::gateway::{GatewayError, VisionGateway};
use crate::grid::{ComposedGrid, Coordinate};
use crate::photo::PhotoId;
use crate::sanitize::truncate;

/// One model's answer for one grid.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub model: String,
    /// Validated coordinates only.
    pub coordinates: BTreeSet<Coordinate>,
    pub success: bool,
    pub raw_text: Option<String>,
    pub error: Option<String>,
}

impl ModelSelection {
    fn failed(model: &str, error: &GatewayError) -> Self {
        Self {
            model: model.to_string(),
            coordinates: BTreeSet::new(),
            success: false,
            raw_text: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusResult {
    /// Union of all models' validated coordinates.
    pub coordinates: BTreeSet<Coordinate>,
    pub selections: Vec<ModelSelection>,
}

impl ConsensusResult {
    /// Photo ids behind the selected coordinates, in layout order.
    pub fn photo_ids(&self, grid: &ComposedGrid) -> Vec<PhotoId> {
        self.coordinates
            .iter()
            .filter_map(|c| grid.photo_at(c).cloned())
            .collect()
    }

    pub fn successful_models(&self) -> usize {
        self.selections.iter().filter(|s| s.success).count()
    }
}

pub struct ConsensusSelector {
    gateway: Arc<dyn VisionGateway>,
    models: Vec<String>,
    timeout: Duration,
    api_calls: AtomicU64,
}

impl ConsensusSelector {
    pub fn new(gateway: Arc<dyn VisionGateway>, models: Vec<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            models,
            timeout,
            api_calls: AtomicU64::new(0),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Model calls attempted so far, successful or not.
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Queries each model in turn and unions the validated picks.
    pub async fn select(&self, grid: &ComposedGrid, prompt: &str) -> ConsensusResult {
        let mut result = ConsensusResult::default();

        for model in &self.models {
            let selection = self
                .query_model(grid, prompt, model)
                .instrument(info_span!("selection.model", model = %model))
                .await;
            result.coordinates.extend(selection.coordinates.iter().copied());
            result.selections.push(selection);
        }

        debug!(
            selected = result.coordinates.len(),
            models_ok = result.successful_models(),
            models = self.models.len(),
            "Consensus for grid {}",
            grid.coord_range()
        );
        result
    }

    async fn query_model(&self, grid: &ComposedGrid, prompt: &str, model: &str) -> ModelSelection {
        self.api_calls.fetch_add(1, Ordering::Relaxed);

        let reply = match tokio::time::timeout(
            self.timeout,
            self.gateway.query(grid.image_bytes(), prompt, model),
        )
        .await
        {
            Ok(reply) => reply,
            Err(_) => Err(GatewayError::Timeout(self.timeout.as_secs())),
        };

        match reply {
            Ok(text) => {
                let parsed = extract_coordinates(&text);
                let coordinates = validate_coordinates(&parsed, grid);
                let dropped = parsed.len() - coordinates.len();
                if dropped > 0 {
                    debug!(dropped, "Discarded coordinates outside the grid");
                }
                ModelSelection {
                    model: model.to_string(),
                    coordinates,
                    success: true,
                    raw_text: Some(truncate(&text, 2000)),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Model query failed: {}", e);
                ModelSelection::failed(model, &e)
            }
        }
    }
}
