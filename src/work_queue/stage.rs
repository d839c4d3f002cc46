//! Stage delegate abstraction.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::DelegateError;

/// An item produced by a delegate, addressed to a downstream stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed<T> {
    pub stage: usize,
    pub item: T,
}

impl<T> Routed<T> {
    pub fn to(stage: usize, item: T) -> Self {
        Self { stage, item }
    }
}

/// The unit of work behind one stage.
///
/// A delegate receives one item and returns the derived items for
/// downstream stages. Terminal stages perform their side effect directly
/// and return an empty list.
#[async_trait]
pub trait StageDelegate<T>: Send + Sync {
    async fn process(&self, item: T) -> Result<Vec<Routed<T>>, DelegateError>;
}

/// Static configuration for one stage, built once per pipeline.
pub struct StageConfig<T> {
    pub name: String,
    pub workers: usize,
    /// Guarded stages stop dispatching once the run's fatal guard is set.
    pub guarded: bool,
    pub delegate: Arc<dyn StageDelegate<T>>,
}

impl<T> StageConfig<T> {
    pub fn new(
        name: impl Into<String>,
        workers: usize,
        delegate: Arc<dyn StageDelegate<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            workers,
            guarded: false,
            delegate,
        }
    }

    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }
}

impl<T> Clone for StageConfig<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            workers: self.workers,
            guarded: self.guarded,
            delegate: Arc::clone(&self.delegate),
        }
    }
}
