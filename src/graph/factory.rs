//! Per-scope manager cache

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;
use crate::model::ApplicationScope;

use super::{GraphServices, ScopedGraphManager};

pub struct GraphManagerFactory {
    services: Arc<GraphServices>,
    managers: Mutex<LruCache<ApplicationScope, Arc<ScopedGraphManager>>>,
}

impl GraphManagerFactory {
    pub fn new(services: Arc<GraphServices>) -> Self {
        let capacity = NonZeroUsize::new(services.config.graph_manager_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self { services, managers: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn services(&self) -> &Arc<GraphServices> {
        &self.services
    }

    /// Cached manager for `scope`, created on first use.
    pub fn create_edge_manager(&self, scope: &ApplicationScope) -> Result<Arc<ScopedGraphManager>> {
        let mut managers = self.managers.lock();
        if let Some(manager) = managers.get(scope) {
            return Ok(manager.clone());
        }
        let manager = Arc::new(ScopedGraphManager::new(self.services.clone(), scope.clone())?);
        managers.put(scope.clone(), manager.clone());
        Ok(manager)
    }

    pub fn invalidate(&self, scope: &ApplicationScope) {
        self.managers.lock().pop(scope);
    }

    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::GraphManager;
    use crate::model::Id;
    use crate::store::MemoryColumnStore;

    fn make_factory(size: usize) -> GraphManagerFactory {
        let config = GraphConfig { graph_manager_cache_size: size, ..Default::default() };
        GraphManagerFactory::new(GraphServices::new(Arc::new(MemoryColumnStore::new()), config).unwrap())
    }

    fn make_scope() -> ApplicationScope {
        ApplicationScope::new(Id::generate("application").unwrap()).unwrap()
    }

    #[test]
    fn test_same_scope_same_manager() {
        let factory = make_factory(4);
        let scope = make_scope();
        let a = factory.create_edge_manager(&scope).unwrap();
        let b = factory.create_edge_manager(&scope).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.scope(), &scope);
    }

    #[test]
    fn test_cache_is_bounded() {
        let factory = make_factory(2);
        for _ in 0..5 {
            factory.create_edge_manager(&make_scope()).unwrap();
        }
        assert_eq!(factory.len(), 2);

        let scope = make_scope();
        factory.create_edge_manager(&scope).unwrap();
        factory.invalidate(&scope);
        assert_eq!(factory.len(), 1);
    }
}
