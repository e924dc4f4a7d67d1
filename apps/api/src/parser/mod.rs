//! Resume parser: the expensive compute step the cache protects.
//!
//! Pluggable like the rest of the service's collaborators: `AppState` carries
//! an `Arc<dyn ResumeParser>`, production wires in `LlmResumeParser`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::llm_client::LlmClient;
use crate::models::resume::ParsedResume;

pub mod extract;
pub mod prompts;

use extract::{contact_from_text, extract_text, merge_contact};
use prompts::{RESUME_PARSE_PROMPT, RESUME_PARSE_SYSTEM};

#[async_trait]
pub trait ResumeParser: Send + Sync {
    async fn parse(&self, bytes: Bytes, mime: &str) -> Result<ParsedResume>;
}

/// Extracts text from the upload, asks the model for structured JSON, then
/// backfills any contact fields the model missed from the raw text.
pub struct LlmResumeParser {
    llm: LlmClient,
}

impl LlmResumeParser {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ResumeParser for LlmResumeParser {
    async fn parse(&self, bytes: Bytes, mime: &str) -> Result<ParsedResume> {
        let byte_len = bytes.len();
        let text = extract_text(bytes, mime).await?;

        let prompt = RESUME_PARSE_PROMPT.replace("{resume_text}", &text);
        let parsed: ParsedResume = self
            .llm
            .call_json(&prompt, RESUME_PARSE_SYSTEM)
            .await
            .context("Unable to parse structured resume JSON from AI response")?;

        info!(byte_len, text_len = text.len(), "Resume parsed by LLM");
        Ok(finish(parsed, &text))
    }
}

fn finish(mut parsed: ParsedResume, text: &str) -> ParsedResume {
    parsed.contact = Some(merge_contact(parsed.contact.take(), contact_from_text(text)));
    parsed
}
