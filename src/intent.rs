use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static AI_TRIGGERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(what|how|which|who|why|where|when|compare|best|vs\.?|versus|recommend|recommendation|difference|alternatives|similar|like|help|find|looking for|i need|top|review)\b|\?",
    )
    .expect("valid trigger pattern")
});

/// How a submitted query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Search,
    Ai,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Search => "search",
            Mode::Ai => "ai",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub mode: Mode,
    /// Lower-cased trigger text, when one matched.
    pub trigger: Option<String>,
}

/// Classifies a query as a literal product search or a question.
pub fn classify(query: &str) -> Mode {
    if AI_TRIGGERS.is_match(query) {
        Mode::Ai
    } else {
        Mode::Search
    }
}

/// Like [`classify`], but also reports which trigger matched first.
pub fn detect(query: &str) -> Detection {
    match AI_TRIGGERS.find(query) {
        Some(found) => Detection {
            mode: Mode::Ai,
            trigger: Some(found.as_str().to_lowercase()),
        },
        None => Detection {
            mode: Mode::Search,
            trigger: None,
        },
    }
}

/// Pinned AI mode bypasses classification entirely.
pub fn resolve_mode(query: &str, ai_pinned: bool) -> Mode {
    if ai_pinned {
        return Mode::Ai;
    }
    classify(query)
}
