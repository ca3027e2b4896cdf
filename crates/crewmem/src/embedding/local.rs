use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::embedding::EmbeddingProvider;
use crate::error::{CrewMemError, Result};

/// Local ONNX embeddings via fastembed
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: usize,
}

/// Map a configured model id to the fastembed model and its output width
pub fn resolve_model(model_id: &str) -> Result<(FastEmbedModel, usize)> {
    match model_id.to_lowercase().as_str() {
        "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            Ok((FastEmbedModel::MultilingualE5Small, 384))
        }
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok((FastEmbedModel::AllMiniLML6V2, 384))
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok((FastEmbedModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok((FastEmbedModel::BGEBaseENV15, 768)),
        other => Err(CrewMemError::Config(format!(
            "Unknown fastembed model: {other}"
        ))),
    }
}

impl FastEmbedProvider {
    /// Load the model, downloading it on first use. Blocking.
    pub fn new(model_id: &str) -> Result<Self> {
        let (model, dimension) = resolve_model(model_id)?;
        let model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| CrewMemError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> String {
        format!("fastembed/{}", self.model_id)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| CrewMemError::Embedding("Embedding model lock poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| CrewMemError::Embedding(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| CrewMemError::Embedding("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| CrewMemError::Embedding(format!("Embedding task failed: {e}")))?
    }
}
