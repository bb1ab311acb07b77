//! Layered memory
//!
//! Five append-only buckets, one per pipeline stage. Every entry carries the
//! index of the instance that wrote it, so readers never infer ownership
//! from position.
//!
//! # Ordering
//! Entries of a layer are kept sorted by instance index, so instance i's
//! output sits at position i when every instance stores once, regardless of
//! completion order. Entries from the same instance keep insertion order.
//!
//! # Concurrency
//! Each store takes the write lock for a single insert, so concurrent writers
//! never lose updates and a stored string is always visible whole.

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Number of layers (one per stage)
pub const LAYER_COUNT: usize = 5;

/// Memory errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Invalid layer {0}: expected 1..=5")]
    InvalidLayer(usize),
}

/// One stored stage output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Index of the pipeline instance that produced the text
    pub instance: usize,
    pub text: String,
}

/// Session-owned store of stage outputs
#[derive(Debug, Default)]
pub struct LayeredMemory {
    layers: RwLock<[Vec<MemoryEntry>; LAYER_COUNT]>,
}

impl LayeredMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` in `layer` (1-based) after every entry of instances `<= instance`
    pub async fn store(
        &self,
        layer: usize,
        instance: usize,
        text: impl Into<String>,
    ) -> Result<(), MemoryError> {
        let slot = slot(layer)?;
        let text = text.into();
        let chars = text.len();

        let mut layers = self.layers.write().await;
        let entries = &mut layers[slot];
        let position = entries.partition_point(|e| e.instance <= instance);
        entries.insert(position, MemoryEntry { instance, text });
        debug!(
            layer,
            instance,
            chars,
            entries = entries.len(),
            "Stored stage output"
        );
        Ok(())
    }

    /// Current texts of `layer` in instance order
    pub async fn retrieve(&self, layer: usize) -> Result<Vec<String>, MemoryError> {
        let slot = slot(layer)?;
        let layers = self.layers.read().await;
        debug!(layer, entries = layers[slot].len(), "Retrieved layer");
        Ok(layers[slot].iter().map(|e| e.text.clone()).collect())
    }

    /// Current entries of `layer`, with their instance tags
    pub async fn retrieve_entries(&self, layer: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let slot = slot(layer)?;
        Ok(self.layers.read().await[slot].clone())
    }

    /// Texts of `layer` written by one instance
    pub async fn retrieve_for_instance(
        &self,
        layer: usize,
        instance: usize,
    ) -> Result<Vec<String>, MemoryError> {
        let slot = slot(layer)?;
        let layers = self.layers.read().await;
        Ok(layers[slot]
            .iter()
            .filter(|e| e.instance == instance)
            .map(|e| e.text.clone())
            .collect())
    }

    /// Entry count of `layer`
    pub async fn len(&self, layer: usize) -> Result<usize, MemoryError> {
        let slot = slot(layer)?;
        Ok(self.layers.read().await[slot].len())
    }
}

fn slot(layer: usize) -> Result<usize, MemoryError> {
    if (1..=LAYER_COUNT).contains(&layer) {
        Ok(layer - 1)
    } else {
        Err(MemoryError::InvalidLayer(layer))
    }
}
