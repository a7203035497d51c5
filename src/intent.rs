//! Intent detection for user turns.
//!
//! The model is asked to answer with a single keyword. Its output is not
//! guaranteed to follow that format, so [`normalize_intent`] maps *any*
//! response onto an [`Intent`], defaulting to [`Intent::Chat`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::LlmClient;

/// The classified purpose of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// General conversation.
    Chat,
    /// The user wants data from the database.
    Query,
    /// The user wants a chart or visualization.
    Visual,
    /// The user wants data and a chart.
    QueryVisual,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Chat,
        Intent::Query,
        Intent::Visual,
        Intent::QueryVisual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Query => "query",
            Self::Visual => "visual",
            Self::QueryVisual => "query_visual",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    /// Exact keyword match only. Use [`normalize_intent`] for model output.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or_else(|| format!("Unknown intent '{s}'"))
    }
}

/// Map a raw model response onto an intent. Total: never fails.
///
/// Precedence: exact keyword, then "visual"+"query", then "visual",
/// then "query" or "data", then [`Intent::Chat`].
pub fn normalize_intent(response: &str) -> Intent {
    let response = response.trim().to_lowercase();

    if let Ok(intent) = response.parse() {
        return intent;
    }

    let has_visual = response.contains("visual");
    let has_query = response.contains("query");

    if has_visual && has_query {
        Intent::QueryVisual
    } else if has_visual {
        Intent::Visual
    } else if has_query || response.contains("data") {
        Intent::Query
    } else {
        Intent::Chat
    }
}

const INTENT_SYSTEM_PROMPT: &str = r#"You are an intent detection agent.
Based on the user's input, determine what the user wants:
- 'chat' : just general conversation
- 'query' : they want data from database
- 'visual' : they want a chart or visualization
- 'query_visual' : they want data and a chart

Respond ONLY with one of these keywords."#;

/// Classifies user input with a model call plus a keyword fallback.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Detect the intent of `input`.
    ///
    /// A failed model call degrades to [`Intent::Chat`].
    pub async fn detect_intent(&self, input: &str) -> Intent {
        match self.llm.complete(INTENT_SYSTEM_PROMPT, input).await {
            Ok(completion) => {
                let intent = normalize_intent(&completion.text);
                debug!(raw = %completion.text.trim(), %intent, "classified input");
                intent
            }
            Err(e) => {
                warn!("Intent detection failed, defaulting to chat: {e}");
                Intent::Chat
            }
        }
    }
}
