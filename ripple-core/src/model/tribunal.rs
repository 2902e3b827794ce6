//! Tribunal types for the deliberation protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce;
use crate::error::{ParseError, ParseResult};
use crate::json::{extract_json_object, require_fields};

/// Lowest ordinal score.
pub const SCORE_MIN: u8 = 1;
/// Highest ordinal score.
pub const SCORE_MAX: u8 = 5;
/// Score used for every dimension when an evaluation cannot be obtained.
pub const NEUTRAL_SCORE: u8 = 3;

/// Static configuration of one tribunal seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TribunalMember {
    pub role: String,
    pub perspective: String,
    pub expertise: String,
}

impl TribunalMember {
    pub fn new(
        role: impl Into<String>,
        perspective: impl Into<String>,
        expertise: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            perspective: perspective.into(),
            expertise: expertise.into(),
        }
    }
}

/// One member's scores and narrative for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TribunalOpinion {
    pub member_role: String,
    /// Ordinal 1..=5 per dimension.
    pub scores: BTreeMap<String, u8>,
    pub narrative: String,
    pub round_number: u32,
}

impl TribunalOpinion {
    /// Decode `{"scores": {dim: n}, "narrative": ".."}` from model output.
    ///
    /// Scores are clamped into 1..=5. A non-numeric score is an error so the
    /// call gets retried.
    pub fn parse(member_role: &str, raw: &str, round_number: u32) -> ParseResult<Self> {
        let obj = extract_json_object(raw)?;
        require_fields(&obj, &["scores"])?;
        let scores_obj = obj
            .get("scores")
            .and_then(Value::as_object)
            .ok_or_else(|| ParseError::invalid("scores", "expected an object"))?;

        let mut scores = BTreeMap::new();
        for (dim, v) in scores_obj {
            let n = coerce::try_i64(v)
                .ok_or_else(|| ParseError::invalid(format!("scores.{}", dim), "not a number"))?;
            scores.insert(dim.clone(), clamp_score(n));
        }

        Ok(Self {
            member_role: member_role.to_string(),
            scores,
            narrative: coerce::as_text(obj.get("narrative")),
            round_number,
        })
    }

    /// Uniform neutral opinion used when evaluation fails.
    pub fn neutral(member_role: &str, dimensions: &[String], round_number: u32, error: &str) -> Self {
        Self {
            member_role: member_role.to_string(),
            scores: dimensions
                .iter()
                .map(|d| (d.clone(), NEUTRAL_SCORE))
                .collect(),
            narrative: format!("Evaluation failed: {}", error),
            round_number,
        }
    }

    /// Carry a prior opinion forward unchanged when revision fails.
    pub fn kept(prior: &TribunalOpinion, round_number: u32, error: &str) -> Self {
        Self {
            member_role: prior.member_role.clone(),
            scores: prior.scores.clone(),
            narrative: format!("Revision failed: {}. Keeping original.", error),
            round_number,
        }
    }

    /// Score for `dimension`, or 0 when absent.
    pub fn score(&self, dimension: &str) -> i32 {
        self.scores.get(dimension).map_or(0, |s| i32::from(*s))
    }
}

/// A challenge one member addressed to another in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenger: String,
    pub target: String,
    pub challenge: String,
}

/// One executed deliberation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliberationRecord {
    pub round_number: u32,
    pub opinions: Vec<TribunalOpinion>,
    pub challenges: Vec<Challenge>,
    pub consensus_points: Vec<String>,
    pub dissent_points: Vec<String>,
    pub converged: bool,
}

fn clamp_score(n: i64) -> u8 {
    n.clamp(i64::from(SCORE_MIN), i64::from(SCORE_MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opinion() {
        let op = TribunalOpinion::parse(
            "MarketAnalyst",
            r#"{"scores": {"demand": 4, "moat": "2", "price": 9, "risk": 0}, "narrative": "solid"}"#,
            1,
        )
        .unwrap();
        assert_eq!(op.member_role, "MarketAnalyst");
        assert_eq!(op.scores["demand"], 4);
        assert_eq!(op.scores["moat"], 2);
        assert_eq!(op.scores["price"], 5);
        assert_eq!(op.scores["risk"], 1);
        assert_eq!(op.narrative, "solid");
        assert_eq!(op.round_number, 1);
    }

    #[test]
    fn test_parse_rejects_bad_scores() {
        assert!(matches!(
            TribunalOpinion::parse("x", r#"{"narrative": "n"}"#, 0),
            Err(ParseError::MissingFields(_))
        ));
        assert!(matches!(
            TribunalOpinion::parse("x", r#"{"scores": {"demand": "high"}}"#, 0),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            TribunalOpinion::parse("x", r#"{"scores": [4]}"#, 0),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_fallbacks() {
        let dims = vec!["demand".to_string(), "moat".to_string()];
        let neutral = TribunalOpinion::neutral("Skeptic", &dims, 0, "timeout");
        assert_eq!(neutral.scores.values().copied().collect::<Vec<_>>(), vec![3, 3]);
        assert!(neutral.narrative.starts_with("Evaluation failed"));

        let kept = TribunalOpinion::kept(&neutral, 2, "bad json");
        assert_eq!(kept.scores, neutral.scores);
        assert_eq!(kept.round_number, 2);
        assert_eq!(kept.narrative, "Revision failed: bad json. Keeping original.");
    }

    #[test]
    fn test_missing_dimension_scores_zero() {
        let op = TribunalOpinion::neutral("a", &["x".to_string()], 0, "");
        assert_eq!(op.score("x"), 3);
        assert_eq!(op.score("y"), 0);
    }
}
