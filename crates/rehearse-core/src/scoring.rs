//! Deterministic topic-coverage scoring.
//!
//! A topic counts as covered iff it appears verbatim (case-sensitive, no
//! normalization) somewhere in the support side's messages. The same
//! `(scenario, conversation)` pair always yields the same coverage.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationResult;
use crate::scenario::Scenario;

/// Partition of a scenario's expected topics plus the resulting score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicCoverage {
    /// Expected topics found, in declaration order
    pub covered: Vec<String>,

    /// Expected topics not found, in declaration order
    pub missing: Vec<String>,

    /// `covered / expected`, in `[0.0, 1.0]`
    pub score: f64,
}

/// Score a conversation against a scenario's expected topics.
///
/// Errored conversations score 0.0 and skip topic analysis entirely.
pub fn score_topics(scenario: &Scenario, conversation: &ConversationResult) -> TopicCoverage {
    score_topic_list(&scenario.expected_topics, conversation)
}

/// Topic scoring over an explicit topic list.
///
/// An empty list scores 1.0 for a completed conversation and 0.0 otherwise.
pub fn score_topic_list(topics: &[String], conversation: &ConversationResult) -> TopicCoverage {
    if conversation.is_error() {
        return TopicCoverage::default();
    }

    let support_text = conversation.support_messages().collect::<Vec<_>>().join(" ");

    let (covered, missing): (Vec<String>, Vec<String>) = topics
        .iter()
        .cloned()
        .partition(|topic| support_text.contains(topic.as_str()));

    let score = if topics.is_empty() {
        if conversation.completed {
            1.0
        } else {
            0.0
        }
    } else {
        covered.len() as f64 / topics.len() as f64
    };

    TopicCoverage {
        covered,
        missing,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;
    use proptest::prelude::*;

    fn conversation(support: &[&str]) -> ConversationResult {
        let mut result = ConversationResult::new("test");
        for (i, message) in support.iter().enumerate() {
            let n = i as u32 + 1;
            result.turns.push(ConversationTurn::user(n, "question"));
            result.turns.push(ConversationTurn::support(n, *message, vec![]));
        }
        result.completed = true;
        result
    }

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partial_coverage() {
        let convo = conversation(&["We cover A here.", "And C as well."]);
        let coverage = score_topic_list(&topics(&["A", "B", "C"]), &convo);

        assert_eq!(coverage.covered, topics(&["A", "C"]));
        assert_eq!(coverage.missing, topics(&["B"]));
        assert!((coverage.score - 0.667).abs() < 0.001);
    }

    #[test]
    fn test_user_messages_do_not_count() {
        let mut convo = conversation(&["nothing relevant"]);
        convo.turns[0].message = "30 days".to_string();
        let coverage = score_topic_list(&topics(&["30 days"]), &convo);
        assert_eq!(coverage.score, 0.0);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let convo = conversation(&["returns within 30 Days"]);
        let coverage = score_topic_list(&topics(&["30 days"]), &convo);
        assert_eq!(coverage.missing, topics(&["30 days"]));
    }

    #[test]
    fn test_empty_topics_follow_completion() {
        let mut convo = conversation(&["hi"]);
        assert_eq!(score_topic_list(&[], &convo).score, 1.0);

        convo.completed = false;
        assert_eq!(score_topic_list(&[], &convo).score, 0.0);
    }

    #[test]
    fn test_error_forces_zero_without_analysis() {
        let mut convo = conversation(&["A B C"]);
        convo.error = Some("support responder failed".to_string());
        let coverage = score_topic_list(&topics(&["A", "B", "C"]), &convo);

        assert_eq!(coverage.score, 0.0);
        assert!(coverage.covered.is_empty());
        assert!(coverage.missing.is_empty());
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(
            expected in proptest::collection::vec("[a-c]{1,2}", 0..6),
            replies in proptest::collection::vec("[a-c ]{0,12}", 0..4),
        ) {
            let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
            let coverage = score_topic_list(&expected, &conversation(&replies));
            prop_assert!((0.0..=1.0).contains(&coverage.score));
        }

        #[test]
        fn prop_coverage_partitions_topics(
            expected in proptest::collection::vec("[a-d]{1,3}", 1..6),
            replies in proptest::collection::vec("[a-d ]{0,16}", 0..4),
        ) {
            let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
            let coverage = score_topic_list(&expected, &conversation(&replies));
            prop_assert_eq!(coverage.covered.len() + coverage.missing.len(), expected.len());
            for topic in &expected {
                prop_assert!(coverage.covered.contains(topic) ^ coverage.missing.contains(topic));
            }
        }

        #[test]
        fn prop_scoring_is_idempotent(
            expected in proptest::collection::vec("[a-d]{1,3}", 1..6),
            replies in proptest::collection::vec("[a-d ]{0,16}", 0..4),
        ) {
            let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
            let convo = conversation(&replies);
            prop_assert_eq!(
                score_topic_list(&expected, &convo),
                score_topic_list(&expected, &convo)
            );
        }
    }
}
