//! Derived Category Cache
//!
//! Holds category views derived from the current FRS snapshot until the
//! snapshot is replaced or a manual input change invalidates them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::aggregate::{category_rank, CategoryView};

pub struct CategoryCache {
    views: Arc<RwLock<HashMap<String, CategoryView>>>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self {
            views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, name: &str) -> Option<CategoryView> {
        let views = self.views.read().await;
        views.get(name).cloned()
    }

    /// All cached views in display order
    pub async fn all(&self) -> Vec<CategoryView> {
        let views = self.views.read().await;
        let mut all: Vec<CategoryView> = views.values().cloned().collect();
        all.sort_by(|a, b| {
            category_rank(&a.name)
                .cmp(&category_rank(&b.name))
                .then_with(|| a.name.cmp(&b.name))
        });
        all
    }

    pub async fn fill(&self, views: Vec<CategoryView>) {
        let mut cached = self.views.write().await;
        cached.clear();
        cached.extend(views.into_iter().map(|v| (v.name.clone(), v)));
    }

    pub async fn clear(&self) {
        let mut views = self.views.write().await;
        views.clear();
    }

    pub async fn len(&self) -> usize {
        self.views.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.views.read().await.is_empty()
    }
}

impl Default for CategoryCache {
    fn default() -> Self {
        Self::new()
    }
}
