//! In-memory model resolution

use meshlod_core::{AssetReference, Error, Model, ModelResolver, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Models registered under their asset reference
#[derive(Default)]
pub struct ModelStore {
    models: RwLock<HashMap<AssetReference, Arc<Model>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the model behind `reference`
    pub fn insert(&self, reference: AssetReference, model: Model) -> Result<Arc<Model>> {
        let model = Arc::new(model);
        self.models
            .write()
            .map_err(|_| Error::MissingSource("model store poisoned".to_string()))?
            .insert(reference, model.clone());
        Ok(model)
    }

    pub fn contains(&self, reference: &AssetReference) -> bool {
        self.models
            .read()
            .map(|m| m.contains_key(reference))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.models.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelResolver for ModelStore {
    fn resolve(&self, reference: &AssetReference) -> Result<Arc<Model>> {
        self.models
            .read()
            .map_err(|_| Error::MissingSource("model store poisoned".to_string()))?
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::MissingSource(format!("no model at {}", reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let store = ModelStore::new();
        let reference = AssetReference::new(7, "models/ship");
        assert!(store.is_empty());
        store.insert(reference.clone(), Model::new()).unwrap();

        assert!(store.contains(&reference));
        assert_eq!(store.len(), 1);
        assert!(store.resolve(&reference).is_ok());

        let missing = store.resolve(&AssetReference::new(8, "models/ship"));
        assert!(matches!(missing, Err(Error::MissingSource(_))));
    }
}
