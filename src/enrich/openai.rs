//! README analysis through an OpenAI-compatible `/chat/completions` endpoint.

use super::Analyzer;
use crate::feed::types::Project;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_readme_chars: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiAnalyzer {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        max_tokens: u32,
        max_readme_chars: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build analyzer HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
            max_readme_chars,
        })
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a char.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt asking for a structured report aimed at independent developers.
pub fn build_prompt(project: &Project, max_readme_chars: usize) -> String {
    let readme = truncate_chars(&project.readme, max_readme_chars);
    let language = if project.language.is_empty() { "unknown" } else { project.language.as_str() };
    format!(
        "You advise independent developers. Analyze the following GitHub project README \
and write a structured report.

Project:
- Name: {}/{}
- Description: {}
- Primary language: {}
- README:
{}

Use exactly these sections:

## Overview
What the project is and which problem it solves.

## Core Features
The main capabilities, as bullet points.

## Technical Approach
Stack, architecture and notable implementation choices.

## Use Cases
Who would use it and in which situations.

## Value for Developers
Ideas, reusable components or techniques worth borrowing.

## Market Signal
The demand or trend this project reflects.

## Highlights
What stands out compared to similar projects.

Ground every statement in the README. Be concise and concrete.",
        project.owner, project.name, project.description, language, readme,
    )
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, project: &Project) -> Result<String> {
        let prompt = build_prompt(project, self.max_readme_chars);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &prompt }],
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("analyzer request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("analyzer {} ({}): {}", self.model, status, body);
        }

        let parsed: ChatResponse = resp.json().await.context("failed to parse analyzer response")?;
        let usage = parsed.usage.unwrap_or_default();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .context("analyzer returned no content")?;

        tracing::info!(
            project = %project.id(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "analysis complete"
        );
        Ok(content)
    }
}
