use crate::data::ResponseTopic;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MIN_CONFIDENCE_VOTES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Helpful,
    NotHelpful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteSummary {
    pub helpful: u64,
    pub not_helpful: u64,
    pub last_vote_ts: u64,
}

impl VoteSummary {
    pub fn total(&self) -> u64 {
        self.helpful.saturating_add(self.not_helpful)
    }

    /// Share of helpful votes, once enough votes exist to mean anything.
    pub fn helpful_ratio(&self) -> Option<f32> {
        let total = self.total();
        if total < MIN_CONFIDENCE_VOTES {
            return None;
        }
        Some(self.helpful as f32 / total as f32)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicFeedback {
    pub topic: ResponseTopic,
    #[serde(flatten)]
    pub summary: VoteSummary,
}

/// In-memory helpful / not-helpful counters for canned answers. Nothing is
/// written to disk; counts reset with the process.
#[derive(Clone, Default)]
pub struct FeedbackLedger {
    inner: Arc<RwLock<HashMap<ResponseTopic, VoteSummary>>>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, topic: ResponseTopic, vote: Vote) -> VoteSummary {
        let mut guard = self.inner.write();
        let stats = guard.entry(topic).or_default();
        match vote {
            Vote::Helpful => stats.helpful = stats.helpful.saturating_add(1),
            Vote::NotHelpful => stats.not_helpful = stats.not_helpful.saturating_add(1),
        }
        stats.last_vote_ts = now_ts();
        let summary = *stats;
        drop(guard);
        debug!(%topic, ?vote, total = summary.total(), "feedback recorded");
        summary
    }

    pub fn summary(&self, topic: ResponseTopic) -> VoteSummary {
        self.inner.read().get(&topic).copied().unwrap_or_default()
    }

    /// Every topic, in declaration order, including ones with no votes yet.
    pub fn snapshot(&self) -> Vec<TopicFeedback> {
        let guard = self.inner.read();
        ResponseTopic::ALL
            .iter()
            .map(|topic| TopicFeedback {
                topic: *topic,
                summary: guard.get(topic).copied().unwrap_or_default(),
            })
            .collect()
    }
}

pub fn describe_ratio(summary: &VoteSummary) -> Option<String> {
    summary.helpful_ratio().map(|ratio| {
        let percent = (ratio * 100.0).round() as i64;
        format!(
            "{percent}% found this helpful ({votes} votes)",
            votes = summary.total()
        )
    })
}

fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_accumulate_per_topic() {
        let ledger = FeedbackLedger::new();
        ledger.record(ResponseTopic::Crm, Vote::Helpful);
        ledger.record(ResponseTopic::Crm, Vote::Helpful);
        let summary = ledger.record(ResponseTopic::Crm, Vote::NotHelpful);
        assert_eq!(summary.helpful, 2);
        assert_eq!(summary.not_helpful, 1);
        assert_eq!(ledger.summary(ResponseTopic::Best), VoteSummary::default());
    }

    #[test]
    fn ratio_needs_enough_votes() {
        let ledger = FeedbackLedger::new();
        for _ in 0..3 {
            ledger.record(ResponseTopic::Reviews, Vote::Helpful);
        }
        assert!(describe_ratio(&ledger.summary(ResponseTopic::Reviews)).is_none());
        ledger.record(ResponseTopic::Reviews, Vote::NotHelpful);
        let summary = ledger.record(ResponseTopic::Reviews, Vote::Helpful);
        assert_eq!(summary.helpful_ratio(), Some(0.8));
        assert_eq!(
            describe_ratio(&summary).as_deref(),
            Some("80% found this helpful (5 votes)")
        );
    }

    #[test]
    fn snapshot_lists_all_topics() {
        let ledger = FeedbackLedger::new();
        ledger.record(ResponseTopic::Default, Vote::NotHelpful);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), ResponseTopic::ALL.len());
        let default = snapshot
            .iter()
            .find(|row| row.topic == ResponseTopic::Default)
            .unwrap();
        assert_eq!(default.summary.not_helpful, 1);
    }

    #[test]
    fn clones_share_counts() {
        let ledger = FeedbackLedger::new();
        let other = ledger.clone();
        other.record(ResponseTopic::Compare, Vote::Helpful);
        assert_eq!(ledger.summary(ResponseTopic::Compare).helpful, 1);
    }
}
