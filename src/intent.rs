//! Deterministic intent extraction from the question text
//!
//! No gateway call happens here: the aggregation intent is derived from
//! keywords and structure alone, so the same question always produces the
//! same intent. The aggregator later resolves the extracted hints against
//! the retrieved schema.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Aggregation functions in the supported vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Calendar buckets for time-series grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Day,
    Month,
    Year,
}

impl TimeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// What the question asks the aggregator to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisIntent {
    /// Explicitly requested aggregate function, if any
    pub function: Option<AggregateFunction>,
    /// Question asks for a ranking ("top", "highest", "most", ...)
    pub ranked: bool,
    /// Sort direction for rankings; descending unless asked for the bottom
    pub descending: bool,
    /// Explicit N from "top 5" / "5 best"
    pub top_n: Option<usize>,
    /// Requested calendar bucketing ("per month", "yearly", ...)
    pub time_bucket: Option<TimeBucket>,
    /// Lowercased content words, used to resolve columns later
    pub tokens: Vec<String>,
}

impl AnalysisIntent {
    /// Whether any aggregation beyond raw rows was requested
    pub fn wants_aggregation(&self) -> bool {
        self.function.is_some() || self.ranked || self.time_bucket.is_some()
    }
}

fn top_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:top|first|best|bottom)[\s-]*(\d+)\b|\b(\d+)\s+(?:top|best|largest|biggest|highest|lowest)\b")
            .expect("top-n regex")
    })
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "on", "for", "to", "and", "or", "are", "is", "was", "were",
    "what", "which", "who", "how", "many", "much", "show", "me", "give", "list", "with", "per",
    "by", "each", "all", "their", "our", "my", "from", "that", "this", "these", "those", "do",
    "does", "did", "have", "has", "had",
];

/// Extract the aggregation intent from a raw question
pub fn parse_intent(question: &str) -> AnalysisIntent {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered.unicode_words().collect();
    let has = |w: &str| words.iter().any(|t| *t == w);

    let mut intent = AnalysisIntent {
        descending: true,
        ..AnalysisIntent::default()
    };

    // Function keywords; the first family that matches wins
    if has("average") || has("avg") || has("mean") {
        intent.function = Some(AggregateFunction::Avg);
    } else if has("count") || (has("how") && has("many")) || (has("number") && has("of")) {
        intent.function = Some(AggregateFunction::Count);
    } else if has("total") || has("sum") || has("revenue") || has("overall") {
        intent.function = Some(AggregateFunction::Sum);
    } else if has("minimum") || has("min") {
        intent.function = Some(AggregateFunction::Min);
    } else if has("maximum") || has("max") {
        intent.function = Some(AggregateFunction::Max);
    }

    // Ranking keywords
    let descending_rank = ["top", "best", "highest", "most", "largest", "biggest"]
        .iter()
        .any(|w| has(w))
        || lowered.contains("most expensive");
    let ascending_rank = ["lowest", "least", "worst", "cheapest", "smallest", "bottom"]
        .iter()
        .any(|w| has(w));
    if descending_rank || ascending_rank {
        intent.ranked = true;
        intent.descending = descending_rank || !ascending_rank;
    }

    if let Some(caps) = top_n_re().captures(&lowered) {
        let digits = caps.get(1).or_else(|| caps.get(2));
        intent.top_n = digits.and_then(|m| m.as_str().parse::<usize>().ok());
    }

    // Calendar bucketing
    if has("monthly") || (lowered.contains("month") && (has("per") || has("by") || has("each"))) {
        intent.time_bucket = Some(TimeBucket::Month);
    } else if has("yearly") || has("annual") || has("annually")
        || (lowered.contains("year") && (has("per") || has("by") || has("each")))
    {
        intent.time_bucket = Some(TimeBucket::Year);
    } else if has("daily") || (lowered.contains("day") && (has("per") || has("by") || has("each")))
    {
        intent.time_bucket = Some(TimeBucket::Day);
    }

    intent.tokens = words
        .iter()
        .filter(|w| !STOP_WORDS.contains(w) && w.parse::<usize>().is_err())
        .map(|w| w.to_string())
        .collect();

    intent
}
