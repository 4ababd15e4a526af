//! Embedder (C6): the provider-agnostic embedding capability.
//!
//! Mirrors the `Tokenizer` trait + `create_tokenizer` factory shape: a small
//! trait object behind an `Arc`, selected by name at startup rather than
//! generic over a concrete type, so the rest of the crate never needs to
//! know which provider is in play.

use crate::config::{Config, EmbeddingProvider};
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed(&[text.to_string()])?.remove(0))
    }
}

/// FastEmbed/ONNX Runtime, downloaded and cached locally on first use.
#[cfg(feature = "semantic")]
pub struct LocalEmbedder {
    dim: usize,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "semantic")]
impl LocalEmbedder {
    pub fn new(model_name: &str, dimensions: usize) -> CoreResult<Self> {
        let embedding_model = resolve_fastembed_model(model_name)
            .ok_or_else(|| CoreError::EmbedderUnavailable(format!("unknown local model '{model_name}'")))?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(embedding_model).with_show_download_progress(false),
        )
        .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?;
        Ok(LocalEmbedder {
            dim: dimensions,
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "semantic")]
fn resolve_fastembed_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    match name {
        "BAAI/bge-base-en-v1.5" | "bge-base" => Some(fastembed::EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-small-en-v1.5" | "bge-small" => Some(fastembed::EmbeddingModel::BGESmallENV15),
        "BAAI/bge-large-en-v1.5" => Some(fastembed::EmbeddingModel::BGELargeENV15),
        _ => None,
    }
}

#[cfg(feature = "semantic")]
impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.lock().map_err(|_| {
            CoreError::EmbedderUnavailable("local embedding model lock poisoned".into())
        })?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))
    }
}

/// Shared request/response plumbing for the two HTTP-backed providers.
struct HttpEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    dim: usize,
    kind: HttpProvider,
}

enum HttpProvider {
    Gemini,
    Openai,
}

impl HttpEmbedder {
    fn new(kind: HttpProvider, model: &str, dimensions: usize, env_var: &str) -> CoreResult<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| CoreError::EmbedderUnavailable(format!("{env_var} is not set")))?;
        Ok(HttpEmbedder {
            client: reqwest::blocking::Client::new(),
            api_key,
            model: model.to_string(),
            dim: dimensions,
            kind,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.kind {
            HttpProvider::Gemini => self.embed_gemini(texts),
            HttpProvider::Openai => self.embed_openai(texts),
        }
    }
}

impl HttpEmbedder {
    fn embed_gemini(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: String,
            content: Content<'a>,
        }
        #[derive(serde::Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(serde::Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            embedding: Embedding,
        }
        #[derive(serde::Deserialize)]
        struct Embedding {
            values: Vec<f32>,
        }

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent?key={}",
                self.model, self.api_key
            );
            let body = Req {
                model: format!("models/{}", self.model),
                content: Content {
                    parts: vec![Part { text }],
                },
            };
            let resp: Resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?
                .error_for_status()
                .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?
                .json()
                .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?;
            out.push(resp.embedding.values);
        }
        Ok(out)
    }

    fn embed_openai(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            data: Vec<Item>,
        }
        #[derive(serde::Deserialize)]
        struct Item {
            embedding: Vec<f32>,
        }

        let resp: Resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?
            .json()
            .map_err(|e| CoreError::EmbedderUnavailable(e.to_string()))?;
        Ok(resp.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Deterministic hash-derived unit vectors, for tests that need an
/// `Embedder` but must not touch the network or a model download.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeEmbedder {
    dim: usize,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        FakeEmbedder { dim }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Embedder for FakeEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hash = crate::hash::hash_bytes(text.as_bytes());
                let mut v: Vec<f32> = (0..self.dim)
                    .map(|i| (hash[i % hash.len()] as f32 / 255.0) - 0.5)
                    .collect();
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut v {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }
}

pub fn create_embedder(config: &Config) -> CoreResult<Arc<dyn Embedder>> {
    tracing::debug!(provider = ?config.embedding_provider, model = %config.embedding_model, "creating embedder");
    match config.embedding_provider {
        EmbeddingProvider::Local => {
            #[cfg(feature = "semantic")]
            {
                Ok(Arc::new(LocalEmbedder::new(
                    &config.embedding_model,
                    config.embedding_dimensions,
                )?))
            }
            #[cfg(not(feature = "semantic"))]
            {
                Err(CoreError::EmbedderUnavailable(
                    "local embeddings require the 'semantic' feature".into(),
                ))
            }
        }
        EmbeddingProvider::Gemini => Ok(Arc::new(HttpEmbedder::new(
            HttpProvider::Gemini,
            &config.embedding_model,
            config.embedding_dimensions,
            "GEMINI_API_KEY",
        )?)),
        EmbeddingProvider::Openai => Ok(Arc::new(HttpEmbedder::new(
            HttpProvider::Openai,
            &config.embedding_model,
            config.embedding_dimensions,
            "OPENAI_API_KEY",
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_embedder_is_deterministic() {
        let e = FakeEmbedder::new(8);
        let a = e.embed_one("fn foo() {}").unwrap();
        let b = e.embed_one("fn foo() {}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn fake_embedder_differs_on_different_text() {
        let e = FakeEmbedder::new(8);
        let a = e.embed_one("fn foo() {}").unwrap();
        let b = e.embed_one("fn bar() {}").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fake_embedder_batches_preserve_order() {
        let e = FakeEmbedder::new(4);
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let batch = e.embed(&texts).unwrap();
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(batch[i], e.embed_one(text).unwrap());
        }
    }

    #[test]
    fn openai_embedder_requires_api_key() {
        std::env::remove_var("OPENAI_API_KEY");
        let result = HttpEmbedder::new(HttpProvider::Openai, "text-embedding-3-small", 1536, "OPENAI_API_KEY");
        assert!(result.is_err());
    }
}
