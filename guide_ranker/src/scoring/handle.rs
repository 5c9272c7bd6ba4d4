use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::info;

use super::{load_model_with_retry, EfficacyModel};
use crate::errors::{GuideError, Result};
use crate::features::FeatureLayout;

/// Shared, swappable reference to the active model.
///
/// Requests pin the model with [`current`] once and use that snapshot for
/// every prediction they make, so a concurrent [`swap`] never mixes two
/// models within one ranking.
///
/// [`current`]: ModelHandle::current
/// [`swap`]: ModelHandle::swap
#[derive(Clone)]
pub struct ModelHandle {
    active: Arc<RwLock<Arc<dyn EfficacyModel>>>,
    layout: FeatureLayout,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("layout", &self.layout)
            .field("n_features", &self.current().n_features())
            .finish()
    }
}

fn check_compatible(model: &dyn EfficacyModel, layout: &FeatureLayout) -> Result<()> {
    model
        .check_integrity()
        .map_err(|reason| GuideError::contract(format!("malformed model: {}", reason)))?;
    if model.n_features() != layout.width() {
        return Err(GuideError::contract(format!(
            "model expects {} features, layout for k={} produces {}",
            model.n_features(),
            layout.kmer_length(),
            layout.width()
        )));
    }
    if let Some(names) = model.feature_names() {
        let expected = layout.column_names();
        if names.len() != expected.len() {
            return Err(GuideError::contract(format!(
                "model names {} columns, layout has {}",
                names.len(),
                expected.len()
            )));
        }
        if let Some((i, (got, want))) = names.iter().zip(&expected).enumerate().find(|(_, (a, b))| a != b) {
            return Err(GuideError::contract(format!(
                "model column {} is {:?}, layout has {:?}",
                i, got, want
            )));
        }
    }
    Ok(())
}

impl ModelHandle {
    pub fn new(model: Arc<dyn EfficacyModel>, layout: FeatureLayout) -> Result<Self> {
        check_compatible(model.as_ref(), &layout)?;
        Ok(ModelHandle {
            active: Arc::new(RwLock::new(model)),
            layout,
        })
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn current(&self) -> Arc<dyn EfficacyModel> {
        let guard = self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Replace the active model, returning the previous one. Requests already
    /// holding a snapshot finish with it.
    pub fn swap(&self, model: Arc<dyn EfficacyModel>) -> Result<Arc<dyn EfficacyModel>> {
        check_compatible(model.as_ref(), &self.layout)?;
        let mut guard = self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(std::mem::replace(&mut *guard, model))
    }

    /// Load an artifact and swap it in. On any failure the active model is
    /// left untouched.
    pub fn reload<P: AsRef<Path>>(&self, path: P, backoff: Duration) -> Result<()> {
        let model = load_model_with_retry(path.as_ref(), backoff)?;
        self.swap(Arc::new(model))?;
        info!("Swapped in model from {}", path.as_ref().display());
        Ok(())
    }
}
