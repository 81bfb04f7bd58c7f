//! Parsing of judge-model replies.
//!
//! The termination classifier and the rubric judge both answer in a fixed
//! text format. Parsing is deterministic and never fails: unusable replies
//! degrade to documented defaults.

use lazy_static::lazy_static;
use regex::Regex;

use crate::evaluation::{LlmEvaluation, NEUTRAL_LLM_SCORE};

/// Token a classifier reply must contain to end the conversation.
pub const END_TOKEN: &str = "END";

/// Token that keeps the conversation going.
pub const CONTINUE_TOKEN: &str = "CONTINUE";

/// Marker preceding the rubric score.
pub const SCORE_MARKER: &str = "SCORE:";

/// Marker preceding the rubric comment.
pub const COMMENT_MARKER: &str = "COMMENT:";

/// Comment used when the judge reply has no readable score.
pub const PARSE_FALLBACK_COMMENT: &str = "Could not parse a score from the judge response.";

/// Comment used when the judge gave a score but no comment.
pub const EMPTY_COMMENT: &str = "No comment provided.";

lazy_static! {
    /// `END` as a standalone word.
    static ref END_WORD: Regex = Regex::new(r"\bEND\b").unwrap();

    /// Signed integer right after the score marker.
    static ref SCORE_VALUE: Regex = Regex::new(r"SCORE:\s*([+-]?\d+)").unwrap();
}

/// Decide whether a classifier reply means "the conversation is over".
///
/// The reply counts as ending only if it contains the end token and does not
/// also contain the continue token, which guards against verbose replies
/// that mention both.
pub fn parse_termination_verdict(reply: &str) -> bool {
    let upper = reply.to_uppercase();
    END_WORD.is_match(&upper) && !upper.contains(CONTINUE_TOKEN)
}

/// Parse a rubric reply of the form `SCORE: <n>` / `COMMENT: <text>`.
///
/// A missing or non-numeric score yields the neutral score with
/// [`PARSE_FALLBACK_COMMENT`]. Numeric scores, including ones too large
/// for `i64`, are clamped into `1..=5`.
pub fn parse_rubric_response(reply: &str) -> LlmEvaluation {
    let score = SCORE_VALUE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            let digits = m.as_str();
            // Out of range for i64 still says which end of the scale was meant.
            digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
                i64::MIN
            } else {
                i64::MAX
            })
        });

    let Some(score) = score else {
        tracing::warn!(reply_len = reply.len(), "Judge response has no parsable score");
        return LlmEvaluation::new(NEUTRAL_LLM_SCORE as i64, PARSE_FALLBACK_COMMENT);
    };

    let comment = extract_comment(reply).unwrap_or_else(|| EMPTY_COMMENT.to_string());
    LlmEvaluation::new(score, comment)
}

fn extract_comment(reply: &str) -> Option<String> {
    let start = reply.find(COMMENT_MARKER)? + COMMENT_MARKER.len();
    let rest = &reply[start..];
    // A score line placed after the comment is not part of it.
    let rest = match rest.find(SCORE_MARKER) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let comment = rest.trim();
    (!comment.is_empty()).then(|| comment.to_string())
}
