//! Small helpers for building outbound HTTP clients with explicit timeouts.
//!
//! Every outbound call in this system (LLM provider, vector index, and the
//! orchestrator's downstream services) carries a per-call timeout (spec §5),
//! following the `reqwest::Client::builder().timeout(...)` pattern the
//! teacher uses in `OpenAIEmbedder::new`.

use std::time::Duration;

pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build HTTP client")
}
