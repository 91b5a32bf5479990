//! Confidence scoring for transforms.
//!
//! The score starts at 1.0 and each factor adjusts it; factors are kept
//! with their sign so the CLI can show the user why a transform scored
//! the way it did.

use crate::query::QueryMatch;
use crate::query::pattern::is_wildcard;
use crate::rewrite::Verb;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factor {
    pub delta: f64,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confidence {
    /// Clamped to [0, 1].
    pub score: f64,
    pub factors: Vec<Factor>,
}

impl Confidence {
    pub fn level(&self) -> ConfidenceLevel {
        if self.score > 0.8 {
            ConfidenceLevel::High
        } else if self.score > 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

pub fn score(verb: Verb, matches: &[QueryMatch], pattern: &str) -> Confidence {
    let mut factors = Vec::new();

    if matches.len() == 1 {
        factors.push(Factor {
            delta: 0.10,
            reason: "unambiguous",
        });
    }
    if matches.len() > 5 {
        factors.push(Factor {
            delta: -0.30,
            reason: "affects many locations",
        });
    }
    if verb == Verb::Delete {
        factors.push(Factor {
            delta: -0.20,
            reason: "destructive",
        });
    }
    if verb == Verb::Replace && matches.iter().any(|m| m.exported) {
        factors.push(Factor {
            delta: -0.20,
            reason: "exported API",
        });
    }
    if is_wildcard(pattern) {
        factors.push(Factor {
            delta: -0.15,
            reason: "wildcard may overmatch",
        });
    }

    let raw: f64 = 1.0 + factors.iter().map(|f| f.delta).sum::<f64>();
    Confidence {
        score: raw.clamp(0.0, 1.0),
        factors,
    }
}
