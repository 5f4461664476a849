use crate::render::format_markdown_lite;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

pub const THINKING_DELAY: Duration = Duration::from_millis(900);
pub const TICK_PERIOD: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    #[default]
    Full,
    Reduced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTiming {
    pub thinking_delay: Duration,
    pub tick: Duration,
    pub motion: Motion,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            thinking_delay: THINKING_DELAY,
            tick: TICK_PERIOD,
            motion: Motion::Full,
        }
    }
}

impl RevealTiming {
    pub fn with_motion(self, motion: Motion) -> Self {
        Self { motion, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealPhase {
    Idle,
    Thinking,
    Revealing,
    Done,
}

/// One write into the answer's text region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "lowercase")]
pub enum RevealFrame {
    /// Plain-text prefix; hosts must insert it as text, not markup.
    Raw(String),
    /// Final markdown-lite markup.
    Formatted(String),
}

impl RevealFrame {
    pub fn body(&self) -> &str {
        match self {
            RevealFrame::Raw(body) | RevealFrame::Formatted(body) => body,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, RevealFrame::Formatted(_))
    }
}

/// Frame plan for one answer: prefixes of 0..=len chars, then the formatted
/// text. Reduced motion skips straight to the formatted text.
pub struct RevealFrames<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
    next: usize,
    finished: bool,
}

pub fn reveal_frames(text: &str, motion: Motion) -> RevealFrames<'_> {
    let boundaries = match motion {
        Motion::Full => text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect(),
        Motion::Reduced => Vec::new(),
    };
    RevealFrames {
        text,
        boundaries,
        next: 0,
        finished: false,
    }
}

impl RevealFrames<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl Iterator for RevealFrames<'_> {
    type Item = RevealFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(&end) = self.boundaries.get(self.next) {
            self.next += 1;
            return Some(RevealFrame::Raw(self.text[..end].to_string()));
        }
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(RevealFrame::Formatted(format_markdown_lite(self.text)))
    }
}

/// Receives the visible effects of a reveal. Implemented by whatever hosts
/// the answer card (terminal, SSE stream, test recorder).
pub trait RevealSink {
    fn phase(&mut self, _phase: RevealPhase) {}
    fn frame(&mut self, frame: RevealFrame);

    /// `false` once nobody is watching; the reveal then stops early.
    fn is_open(&self) -> bool {
        true
    }
}

impl<S: RevealSink + ?Sized> RevealSink for &mut S {
    fn phase(&mut self, phase: RevealPhase) {
        (**self).phase(phase);
    }

    fn frame(&mut self, frame: RevealFrame) {
        (**self).frame(frame);
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Hands out reveal tickets. Each `begin` supersedes every earlier ticket.
#[derive(Debug, Clone, Default)]
pub struct RevealController {
    generation: Arc<AtomicU64>,
}

impl RevealController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RevealTicket {
        let id = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        RevealTicket {
            id,
            generation: Arc::clone(&self.generation),
        }
    }

    /// Re-acquires ticket `id` if nothing newer has begun since.
    pub fn resume(&self, id: u64) -> Option<RevealTicket> {
        (id != 0 && self.current() == id).then(|| RevealTicket {
            id,
            generation: Arc::clone(&self.generation),
        })
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct RevealTicket {
    id: u64,
    generation: Arc<AtomicU64>,
}

impl RevealTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RevealOutcome {
    Completed { frames: usize },
    Superseded { frames: usize },
    /// The sink closed before the answer finished.
    Abandoned { frames: usize },
}

/// Plays `text` into `sink`: thinking delay, then the frame plan paced by
/// `timing.tick`. Stops early once `ticket` is no longer current or the sink
/// has closed.
pub async fn run_reveal<S: RevealSink>(
    ticket: &RevealTicket,
    text: &str,
    timing: RevealTiming,
    mut sink: S,
) -> RevealOutcome {
    sink.phase(RevealPhase::Thinking);
    time::sleep(timing.thinking_delay).await;
    if !sink.is_open() {
        debug!(ticket = ticket.id(), "reveal abandoned while thinking");
        return RevealOutcome::Abandoned { frames: 0 };
    }
    if !ticket.is_current() {
        debug!(ticket = ticket.id(), "reveal superseded while thinking");
        return RevealOutcome::Superseded { frames: 0 };
    }
    sink.phase(RevealPhase::Revealing);

    let mut ticker = time::interval(timing.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut emitted = 0usize;
    for frame in reveal_frames(text, timing.motion) {
        // Frame 0 (the empty region) and the final swap share a tick with
        // their neighbours; every other raw prefix waits one period.
        if emitted > 0 && !frame.is_final() {
            ticker.tick().await;
        }
        if !ticket.is_current() {
            debug!(ticket = ticket.id(), frames = emitted, "reveal superseded");
            return RevealOutcome::Superseded { frames: emitted };
        }
        if !sink.is_open() {
            debug!(ticket = ticket.id(), frames = emitted, "reveal abandoned");
            return RevealOutcome::Abandoned { frames: emitted };
        }
        sink.frame(frame);
        emitted += 1;
    }
    sink.phase(RevealPhase::Done);
    debug!(ticket = ticket.id(), frames = emitted, "reveal completed");
    RevealOutcome::Completed { frames: emitted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        phases: Vec<RevealPhase>,
        frames: Vec<RevealFrame>,
        /// Closes the sink after this many frames.
        close_after: Option<usize>,
    }

    impl RevealSink for Recorder {
        fn phase(&mut self, phase: RevealPhase) {
            self.phases.push(phase);
        }

        fn frame(&mut self, frame: RevealFrame) {
            self.frames.push(frame);
        }

        fn is_open(&self) -> bool {
            self.close_after.is_none_or(|limit| self.frames.len() < limit)
        }
    }

    #[test]
    fn full_motion_plan_has_every_prefix_then_formatted() {
        let text = "A **b**";
        let frames: Vec<_> = reveal_frames(text, Motion::Full).collect();
        assert_eq!(frames.len(), text.chars().count() + 2);
        for (len, frame) in frames[..frames.len() - 1].iter().enumerate() {
            let expected: String = text.chars().take(len).collect();
            assert_eq!(frame, &RevealFrame::Raw(expected));
        }
        assert_eq!(
            frames.last(),
            Some(&RevealFrame::Formatted("A <strong>b</strong>".to_string()))
        );
    }

    #[test]
    fn reduced_motion_plan_is_one_frame() {
        let frames: Vec<_> = reveal_frames("**hi**", Motion::Reduced).collect();
        assert_eq!(
            frames,
            vec![RevealFrame::Formatted("<strong>hi</strong>".to_string())]
        );
    }

    #[test]
    fn prefixes_split_on_char_boundaries() {
        let frames: Vec<_> = reveal_frames("4★ ok", Motion::Full).collect();
        assert_eq!(frames[2], RevealFrame::Raw("4★".to_string()));
        assert_eq!(frames.len(), 5 + 2);
    }

    #[test]
    fn empty_text_still_finishes() {
        let frames: Vec<_> = reveal_frames("", Motion::Full).collect();
        assert_eq!(
            frames,
            vec![
                RevealFrame::Raw(String::new()),
                RevealFrame::Formatted(String::new())
            ]
        );
    }

    #[test]
    fn tickets_supersede_each_other() {
        let controller = RevealController::new();
        let first = controller.begin();
        assert!(first.is_current());
        let second = controller.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(controller.resume(first.id()).is_none());
        assert_eq!(controller.resume(second.id()).map(|t| t.id()), Some(second.id()));
        assert!(controller.resume(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn full_reveal_paces_frames() {
        let text = "Hello **world**";
        let controller = RevealController::new();
        let ticket = controller.begin();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        let outcome = run_reveal(&ticket, text, RevealTiming::default(), &mut recorder).await;

        let len = text.chars().count();
        assert_eq!(outcome, RevealOutcome::Completed { frames: len + 2 });
        assert_eq!(
            recorder.phases,
            vec![RevealPhase::Thinking, RevealPhase::Revealing, RevealPhase::Done]
        );
        let raw = recorder
            .frames
            .iter()
            .filter(|frame| matches!(frame, RevealFrame::Raw(_)))
            .count();
        assert_eq!(raw, len + 1);
        assert!(recorder.frames.last().is_some_and(RevealFrame::is_final));
        assert!(start.elapsed() >= THINKING_DELAY + TICK_PERIOD * len as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn reduced_reveal_writes_once() {
        let controller = RevealController::new();
        let ticket = controller.begin();
        let mut recorder = Recorder::default();
        let start = Instant::now();
        let timing = RevealTiming::default().with_motion(Motion::Reduced);
        let outcome = run_reveal(&ticket, "**done**", timing, &mut recorder).await;

        assert_eq!(outcome, RevealOutcome::Completed { frames: 1 });
        assert_eq!(
            recorder.frames,
            vec![RevealFrame::Formatted("<strong>done</strong>".to_string())]
        );
        assert!(start.elapsed() >= THINKING_DELAY);
        assert!(start.elapsed() < THINKING_DELAY + TICK_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_submission_stops_running_reveal() {
        let controller = RevealController::new();
        let ticket = controller.begin();
        let handle = tokio::spawn(async move {
            let mut recorder = Recorder::default();
            let outcome = run_reveal(
                &ticket,
                "a fairly long answer that takes a while to type out",
                RevealTiming::default(),
                &mut recorder,
            )
            .await;
            (outcome, recorder)
        });

        time::sleep(THINKING_DELAY + TICK_PERIOD * 5).await;
        let _newer = controller.begin();
        let (outcome, recorder) = handle.await.expect("reveal task");

        let RevealOutcome::Superseded { frames } = outcome else {
            panic!("expected superseded reveal, got {outcome:?}");
        };
        assert!(frames > 0);
        assert_eq!(recorder.frames.len(), frames);
        assert!(!recorder.phases.contains(&RevealPhase::Done));
        assert!(recorder.frames.iter().all(|frame| !frame.is_final()));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_during_thinking_writes_nothing() {
        let controller = RevealController::new();
        let ticket = controller.begin();
        let _newer = controller.begin();
        let mut recorder = Recorder::default();
        let outcome = run_reveal(&ticket, "text", RevealTiming::default(), &mut recorder).await;
        assert_eq!(outcome, RevealOutcome::Superseded { frames: 0 });
        assert!(recorder.frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_sink_stops_ticking() {
        let controller = RevealController::new();
        let ticket = controller.begin();
        let mut recorder = Recorder {
            close_after: Some(3),
            ..Recorder::default()
        };
        let start = Instant::now();
        let text = "a fairly long answer that takes a while to type out";
        let outcome = run_reveal(&ticket, text, RevealTiming::default(), &mut recorder).await;

        assert_eq!(outcome, RevealOutcome::Abandoned { frames: 3 });
        assert_eq!(recorder.frames.len(), 3);
        assert!(!recorder.phases.contains(&RevealPhase::Done));
        assert!(start.elapsed() < THINKING_DELAY + TICK_PERIOD * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_closed_while_thinking_writes_nothing() {
        let controller = RevealController::new();
        let ticket = controller.begin();
        let mut recorder = Recorder {
            close_after: Some(0),
            ..Recorder::default()
        };
        let outcome = run_reveal(&ticket, "text", RevealTiming::default(), &mut recorder).await;
        assert_eq!(outcome, RevealOutcome::Abandoned { frames: 0 });
        assert_eq!(recorder.phases, vec![RevealPhase::Thinking]);
    }
}
