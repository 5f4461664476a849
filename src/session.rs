use crate::data::{ProductRecord, ResponseTopic};
use crate::intent::{Mode, resolve_mode};
use crate::render::{RenderError, escape_html, render_product_card, render_response_shell};
use crate::resolve::{resolve_product, resolve_topic};
use crate::reveal::{RevealController, RevealPhase, RevealTicket};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

pub const SEARCH_PLACEHOLDER: &str = "Discover what's new at G2...";
pub const AI_PLACEHOLDER: &str = "Ask me anything about software...";
pub const IDLE_HINT: &str = r#"Try <em>"HubSpot"</em> to search, or <em>"What's the best CRM for startups?"</em> for AI help"#;
pub const AI_PINNED_HINT: &str = "✨ AI Mode on — ask a question or choose a suggestion below";
pub const AI_TYPING_HINT: &str = "✨ AI mode — press Enter to get an intelligent recommendation";
pub const SEARCH_TYPING_HINT: &str = "🔍 Search mode — press Enter to find software reviews";
pub const FOLLOW_UP_HINT: &str = "Ask a follow-up, or search for specific software";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("query is empty")]
    EmptyQuery,
    #[error(transparent)]
    Render(#[from] RenderErrorMessage),
}

/// `askama::Error` is neither `Clone` nor `Eq`; keep its message instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderErrorMessage(String);

impl From<RenderError> for SubmitError {
    fn from(err: RenderError) -> Self {
        SubmitError::Render(RenderErrorMessage(err.to_string()))
    }
}

/// A trimmed, non-empty query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn parse(raw: &str) -> Result<Self, SubmitError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status-line text under the search box. `Markup` is trusted HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Hint {
    Plain(String),
    Markup(&'static str),
}

impl Hint {
    pub fn to_html(&self) -> String {
        match self {
            Hint::Plain(text) => escape_html(text),
            Hint::Markup(markup) => (*markup).to_string(),
        }
    }

    pub fn plain_text(&self) -> String {
        match self {
            Hint::Plain(text) => text.clone(),
            Hint::Markup(markup) => markup.replace("<em>", "").replace("</em>", ""),
        }
    }
}

/// What the page should do while the visitor is typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFeedback {
    /// `None` leaves the current hint untouched.
    pub hint: Option<Hint>,
    pub hide_results: bool,
}

#[derive(Debug, Clone)]
pub enum Submission {
    Product {
        query: Query,
        record: ProductRecord,
        card_html: String,
        hint: Hint,
    },
    Answer {
        query: Query,
        topic: ResponseTopic,
        text: &'static str,
        shell_html: String,
        ticket: RevealTicket,
        hint: Option<Hint>,
    },
}

impl Submission {
    pub fn mode(&self) -> Mode {
        match self {
            Submission::Product { .. } => Mode::Search,
            Submission::Answer { .. } => Mode::Ai,
        }
    }

    pub fn query(&self) -> &Query {
        match self {
            Submission::Product { query, .. } | Submission::Answer { query, .. } => query,
        }
    }

    /// Markup for the result panel right after submission.
    pub fn panel_html(&self) -> &str {
        match self {
            Submission::Product { card_html, .. } => card_html,
            Submission::Answer { shell_html, .. } => shell_html,
        }
    }

    pub fn hint(&self) -> Option<&Hint> {
        match self {
            Submission::Product { hint, .. } => Some(hint),
            Submission::Answer { hint, .. } => hint.as_ref(),
        }
    }

    /// Product cards are complete on arrival; answers still have to reveal.
    pub fn phase(&self) -> RevealPhase {
        match self {
            Submission::Product { .. } => RevealPhase::Done,
            Submission::Answer { .. } => RevealPhase::Idle,
        }
    }
}

/// Per-visitor state: the AI-mode pin and the reveal generation.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    ai_pinned: bool,
    reveal: RevealController,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ai_pinned(&self) -> bool {
        self.ai_pinned
    }

    pub fn set_ai_pinned(&mut self, pinned: bool) {
        self.ai_pinned = pinned;
    }

    /// Flips the pin and returns the new state. The result panel is hidden on
    /// a toggle, so any answer still revealing is stopped.
    pub fn toggle_ai_mode(&mut self) -> bool {
        self.ai_pinned = !self.ai_pinned;
        self.reveal.begin();
        info!(pinned = self.ai_pinned, "AI mode toggled");
        self.ai_pinned
    }

    pub fn reveal_controller(&self) -> &RevealController {
        &self.reveal
    }

    pub fn placeholder(&self) -> &'static str {
        if self.ai_pinned {
            AI_PLACEHOLDER
        } else {
            SEARCH_PLACEHOLDER
        }
    }

    /// Hint shown when the box is idle (page load or after a toggle).
    pub fn resting_hint(&self) -> Hint {
        if self.ai_pinned {
            Hint::Plain(AI_PINNED_HINT.to_string())
        } else {
            Hint::Markup(IDLE_HINT)
        }
    }

    pub fn mode_for(&self, query: &Query) -> Mode {
        resolve_mode(query.as_str(), self.ai_pinned)
    }

    /// Live feedback for the text currently in the box.
    pub fn input_feedback(&self, raw: &str) -> InputFeedback {
        if self.ai_pinned {
            return InputFeedback {
                hint: None,
                hide_results: false,
            };
        }
        let Ok(query) = Query::parse(raw) else {
            return InputFeedback {
                hint: Some(Hint::Markup(IDLE_HINT)),
                hide_results: true,
            };
        };
        let hint = match self.mode_for(&query) {
            Mode::Ai => AI_TYPING_HINT,
            Mode::Search => SEARCH_TYPING_HINT,
        };
        InputFeedback {
            hint: Some(Hint::Plain(hint.to_string())),
            hide_results: false,
        }
    }

    /// Runs the pipeline for one submission. Every accepted submission starts
    /// a new reveal generation, so any answer still being revealed for this
    /// session stops on its next tick.
    pub fn submit(&self, raw: &str) -> Result<Submission, SubmitError> {
        let query = Query::parse(raw)?;
        let mode = self.mode_for(&query);
        let ticket = self.reveal.begin();
        debug!(query = %query, %mode, ticket = ticket.id(), "submission accepted");
        match mode {
            Mode::Search => {
                let record = resolve_product(query.as_str());
                let card_html = render_product_card(&record)?;
                let hint = Hint::Plain(format!(
                    "Showing results for \"{query}\" · Ask a question for AI-powered help"
                ));
                Ok(Submission::Product {
                    query,
                    record,
                    card_html,
                    hint,
                })
            }
            Mode::Ai => {
                let topic = resolve_topic(query.as_str());
                let shell_html = render_response_shell()?;
                let hint = (!self.ai_pinned).then(|| Hint::Plain(FOLLOW_UP_HINT.to_string()));
                Ok(Submission::Answer {
                    query,
                    topic,
                    text: topic.text(),
                    shell_html,
                    ticket,
                    hint,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queries_are_rejected() {
        let session = SearchSession::new();
        for raw in ["", "   ", "\t\n"] {
            assert!(matches!(session.submit(raw), Err(SubmitError::EmptyQuery)));
        }
        // Rejected input does not start a reveal generation.
        assert_eq!(session.reveal_controller().current(), 0);
    }

    #[test]
    fn queries_are_trimmed() {
        let query = Query::parse("  hubspot \n").unwrap();
        assert_eq!(query.as_str(), "hubspot");
    }

    #[test]
    fn product_search_renders_card() {
        let session = SearchSession::new();
        let submission = session.submit("HubSpot").unwrap();
        assert_eq!(submission.mode(), Mode::Search);
        assert_eq!(submission.phase(), RevealPhase::Done);
        let Submission::Product { record, card_html, hint, .. } = submission else {
            panic!("expected a product card");
        };
        assert_eq!(record.name, "HubSpot CRM");
        assert!(card_html.contains("12,480 reviews"));
        assert_eq!(
            hint.plain_text(),
            "Showing results for \"HubSpot\" · Ask a question for AI-powered help"
        );
    }

    #[test]
    fn question_renders_shell_and_picks_topic() {
        let session = SearchSession::new();
        let submission = session.submit("What's the best CRM for startups?").unwrap();
        assert_eq!(submission.mode(), Mode::Ai);
        assert_eq!(submission.phase(), RevealPhase::Idle);
        let Submission::Answer { topic, text, shell_html, ticket, hint, .. } = submission else {
            panic!("expected an answer");
        };
        assert_eq!(topic, ResponseTopic::Crm);
        assert_eq!(text, ResponseTopic::Crm.text());
        assert!(shell_html.contains("ai-loading"));
        assert!(ticket.is_current());
        assert_eq!(hint, Some(Hint::Plain(FOLLOW_UP_HINT.to_string())));
    }

    #[test]
    fn pinned_session_always_answers() {
        let mut session = SearchSession::new();
        assert!(session.toggle_ai_mode());
        let submission = session.submit("HubSpot").unwrap();
        assert_eq!(submission.mode(), Mode::Ai);
        // Pinned mode keeps the toggle's hint.
        assert!(submission.hint().is_none());
        assert!(!session.toggle_ai_mode());
        assert_eq!(session.submit("HubSpot").unwrap().mode(), Mode::Search);
    }

    #[test]
    fn later_submission_supersedes_earlier_answer() {
        let session = SearchSession::new();
        let Submission::Answer { ticket, .. } = session.submit("how do I pick a tool?").unwrap()
        else {
            panic!("expected an answer");
        };
        session.submit("zoom").unwrap();
        assert!(!ticket.is_current());
    }

    #[test]
    fn input_feedback_follows_mode() {
        let session = SearchSession::new();
        let feedback = session.input_feedback("which is best");
        assert_eq!(feedback.hint, Some(Hint::Plain(AI_TYPING_HINT.to_string())));
        let feedback = session.input_feedback("slack");
        assert_eq!(feedback.hint, Some(Hint::Plain(SEARCH_TYPING_HINT.to_string())));
        let feedback = session.input_feedback("  ");
        assert!(feedback.hide_results);
        assert_eq!(feedback.hint, Some(Hint::Markup(IDLE_HINT)));
    }

    #[test]
    fn pinned_session_leaves_hint_alone_while_typing() {
        let mut session = SearchSession::new();
        session.set_ai_pinned(true);
        let feedback = session.input_feedback("");
        assert_eq!(feedback.hint, None);
        assert!(!feedback.hide_results);
        assert_eq!(session.placeholder(), AI_PLACEHOLDER);
        assert_eq!(session.resting_hint().plain_text(), AI_PINNED_HINT);
    }

    #[test]
    fn plain_hints_are_escaped() {
        let hint = Hint::Plain("<b>\"x\"</b>".to_string());
        assert!(!hint.to_html().contains("<b>"));
        assert!(Hint::Markup(IDLE_HINT).to_html().contains("<em>"));
    }
}
