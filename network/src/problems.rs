// SPDX-License-Identifier: MIT OR Apache-2.0

//! Problem-fetch client with stale-response suppression.
//!
//! The quiz widget fetches one problem per round. A fetch resolving after
//! a newer round has already started must never be applied, so every
//! fetch is tagged with a generation taken from [`ProblemClient::begin`];
//! the response is dropped when the generation has moved on by the time
//! it resolves. This is the same token guard the session uses for timers.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One word of a memory set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    /// Displayed text
    pub text: String,
    /// Reading shown on the review list
    #[serde(default)]
    pub kana: String,
}

/// A quiz problem: the correct word plus distractor options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub correct: Word,
    /// Correct word and distractors, in display order
    pub options: Vec<Word>,
}

/// HTTP client for the problem endpoint.
pub struct ProblemClient {
    http: reqwest::Client,
    base_url: String,
    generation: AtomicU64,
}

impl ProblemClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            generation: AtomicU64::new(0),
        }
    }

    /// Start a fetch for a new round, invalidating any fetch in flight.
    /// Returns the generation to pass to [`ProblemClient::fetch`].
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Fetch a problem. Returns `Ok(None)` when a newer round started
    /// while the request was in flight.
    pub async fn fetch(
        &self,
        set_id: &str,
        seed: &str,
        generation: u64,
    ) -> Result<Option<Problem>> {
        let url = format!("{}/api/problem", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("set_id", set_id), ("seed", seed)])
            .send()
            .await
            .context("problem request failed")?
            .error_for_status()
            .context("problem endpoint returned an error")?;
        let problem: Problem = response
            .json()
            .await
            .context("malformed problem response")?;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "discarding stale problem response");
            return Ok(None);
        }
        Ok(Some(problem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_invalidates_previous_generation() {
        let client = ProblemClient::new("http://127.0.0.1:8000");
        let first = client.begin();
        let second = client.begin();
        assert!(second > first);
    }

    #[test]
    fn problem_deserializes_backend_shape() {
        let json = r#"{
            "correct": {"text": "apple", "kana": "りんご"},
            "options": [
                {"text": "apple", "kana": "りんご"},
                {"text": "grape", "kana": "ぶどう"}
            ]
        }"#;
        let problem: Problem = serde_json::from_str(json).unwrap();
        assert_eq!(problem.correct.text, "apple");
        assert_eq!(problem.options.len(), 2);
    }
}
