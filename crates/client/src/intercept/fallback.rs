//! Synthesized offline answer for API requests.

use gramsevak_core::ResponseSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Offline notice shown in place of an answer.
pub const OFFLINE_ANSWER: &str = "आप ऑफलाइन हैं। कृपया इंटरनेट कनेक्शन जांचें।";

/// Scheme label attached to the offline notice.
pub const OFFLINE_SCHEME_NAME: &str = "ऑफलाइन";

/// `source` tag marking the answer as produced by the cache layer.
pub const OFFLINE_SOURCE: &str = "offline_cache";

/// Shape of the synthesized offline payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineAnswer {
    pub answer: String,
    pub scheme_name: String,
    pub source: String,
    pub cached: bool,
}

/// Build the offline placeholder response. Never fails.
pub fn offline_response() -> ResponseSnapshot {
    let notice = OfflineAnswer {
        answer: OFFLINE_ANSWER.to_string(),
        scheme_name: OFFLINE_SCHEME_NAME.to_string(),
        source: OFFLINE_SOURCE.to_string(),
        cached: true,
    };
    let body = json!(notice).to_string();

    ResponseSnapshot::new(
        200,
        vec![("content-type".to_string(), "application/json; charset=utf-8".to_string())],
        body,
    )
}
