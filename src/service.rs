//! Collaborator seams for figure description.
//!
//! Two traits isolate the only non-deterministic inputs of the pipeline:
//!
//! * [`DescriptionService`] — a vision-capable completion service. The
//!   production implementation, [`LlmDescriptionService`], forwards to any
//!   `edgequake_llm` provider; tests substitute a scripted mock.
//! * [`ImagePayloadSource`] — the extraction collaborator's image lookup by
//!   `(page, image_index)`. Missing payloads are a normal condition (vector
//!   art, unsupported filters) and simply route the figure to the fallback.

use crate::error::DescribeError;
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// One fully-prepared description request.
#[derive(Debug, Clone)]
pub struct DescriptionRequest {
    /// Fragment being described, for logging.
    pub fragment_id: String,
    pub system_prompt: String,
    pub prompt: String,
    pub image: EncodedImage,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A remote service that turns an image plus prompt into a description.
///
/// One call is one attempt; retries, timeouts and backoff belong to the
/// caller ([`crate::pipeline::describe`]).
#[async_trait]
pub trait DescriptionService: Send + Sync {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescribeError>;
}

/// [`DescriptionService`] backed by an `edgequake_llm` provider.
pub struct LlmDescriptionService {
    provider: Arc<dyn LLMProvider>,
}

impl LlmDescriptionService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl DescriptionService for LlmDescriptionService {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescribeError> {
        // Alt text never needs fine print; the low-detail tile is enough.
        let image = ImageData::new(request.image.data.clone(), request.image.mime_type.clone())
            .with_detail("low");

        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user_with_images(request.prompt.as_str(), vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DescribeError::Api {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.fragment_id, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Raw image bytes as stored in the source PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
}

/// Image lookup provided by the extraction collaborator.
pub trait ImagePayloadSource: Send + Sync {
    /// Bytes of image `image_index` on `page`, or `None` when unavailable.
    fn load(&self, page: usize, image_index: usize) -> Option<ImagePayload>;
}

/// Source for callers that have no image bytes at all.
pub struct NoImagePayloads;

impl ImagePayloadSource for NoImagePayloads {
    fn load(&self, _page: usize, _image_index: usize) -> Option<ImagePayload> {
        None
    }
}

/// Reads images dumped by the extractor as `page{P}_img{I}.{png,jpg,jpeg}`.
#[derive(Debug, Clone)]
pub struct DirectoryPayloads {
    dir: PathBuf,
}

impl DirectoryPayloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImagePayloadSource for DirectoryPayloads {
    fn load(&self, page: usize, image_index: usize) -> Option<ImagePayload> {
        ["png", "jpg", "jpeg"].iter().find_map(|ext| {
            let path = self.dir.join(format!("page{page}_img{image_index}.{ext}"));
            match std::fs::read(&path) {
                Ok(bytes) if !bytes.is_empty() => Some(ImagePayload { bytes }),
                _ => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_payloads_is_always_empty() {
        assert!(NoImagePayloads.load(0, 0).is_none());
    }

    #[test]
    fn directory_payloads_find_any_known_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page2_img1.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
        let source = DirectoryPayloads::new(dir.path());

        let payload = source.load(2, 1).expect("jpg should be found");
        assert_eq!(payload.bytes, vec![0xFF, 0xD8, 0xFF]);
        assert!(source.load(2, 0).is_none());
    }

    #[test]
    fn directory_payloads_skip_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page0_img0.png"), []).unwrap();
        assert!(DirectoryPayloads::new(dir.path()).load(0, 0).is_none());
    }
}
