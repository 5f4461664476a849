pub mod data;
pub mod feedback;
pub mod intent;
pub mod render;
pub mod resolve;
pub mod reveal;
pub mod session;
#[cfg(feature = "web")]
pub mod web;

pub use data::{PRODUCT_FIXTURES, ProductRecord, ResponseTopic, SUGGESTION_CHIPS};
pub use feedback::{FeedbackLedger, Vote, VoteSummary};
pub use intent::{Detection, Mode, classify, detect, resolve_mode};
pub use render::{
    RenderError, StarRow, escape_html, format_markdown_lite, render_product_card,
    render_response_shell, render_stars,
};
pub use resolve::{resolve_product, resolve_response, resolve_topic, title_case};
pub use reveal::{
    Motion, RevealController, RevealFrame, RevealOutcome, RevealPhase, RevealSink, RevealTicket,
    RevealTiming, reveal_frames, run_reveal,
};
pub use session::{Hint, InputFeedback, Query, SearchSession, SubmitError, Submission};
