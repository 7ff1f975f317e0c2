// In-process embedder for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Embedder, Vector, normalize_query_text};
use crate::{Result, StorefrontError};

/// Returns canned vectors per text, falling back to a deterministic hash vector.
pub(crate) struct FakeEmbedder {
    dimension: usize,
    canned: Mutex<HashMap<String, Vector>>,
    fail: bool,
    pub(crate) batch_calls: AtomicUsize,
    pub(crate) single_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            canned: Mutex::new(HashMap::new()),
            fail: false,
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub(crate) fn with_vector(self, text: &str, vector: Vector) -> Self {
        self.canned
            .lock()
            .expect("canned vectors lock")
            .insert(text.to_string(), vector);
        self
    }

    fn vector_for(&self, text: &str) -> Vector {
        if let Some(vector) = self.canned.lock().expect("canned vectors lock").get(text) {
            return vector.clone();
        }

        // Stable pseudo-embedding so equal text yields equal vectors
        let mut state = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
        (0..self.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state % 2000) as f32 / 1000.0) - 1.0
            })
            .collect()
    }
}

impl Embedder for FakeEmbedder {
    fn embed_one(&self, text: &str) -> Result<Vector> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StorefrontError::EmbeddingService(
                "fake embedder configured to fail".to_string(),
            ));
        }
        Ok(self.vector_for(&normalize_query_text(text)))
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StorefrontError::EmbeddingService(
                "fake embedder configured to fail".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "fake-embedder"
    }
}
