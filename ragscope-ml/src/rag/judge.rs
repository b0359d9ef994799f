//! LLM-as-judge scoring.
//!
//! A judge model rates each answer on three metrics. Every metric always
//! yields a value: the parsed score in `[0.0, 1.0]`, or [`UNSCOREABLE`] when
//! the judge reply has no usable number or the judge call fails.

use futures::future::join_all;
use ragscope_core::error::RagError;
use ragscope_core::models::ModelAdapter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::rag::prompts;

/// Sentinel recorded when a metric could not be scored.
pub const UNSCOREABLE: f64 = -1.0;

/// Extract a score from a judge reply.
///
/// Takes the first ASCII number in the trimmed text and accepts it only
/// inside `[0.0, 1.0]`. Digits from other scripts are not numbers here.
pub fn parse_score(text: &str) -> Option<f64> {
    let re = regex::Regex::new(r"[0-9]+\.?[0-9]*").ok()?;
    let found = re.find(text.trim())?;
    let value: f64 = found.as_str().parse().ok()?;
    (0.0..=1.0).contains(&value).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JudgeMetric {
    Faithfulness,
    AnswerRelevance,
    ContextRelevance,
}

impl JudgeMetric {
    pub const ALL: [JudgeMetric; 3] = [
        Self::Faithfulness,
        Self::AnswerRelevance,
        Self::ContextRelevance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Faithfulness => "faithfulness",
            Self::AnswerRelevance => "answer_relevance",
            Self::ContextRelevance => "context_relevance",
        }
    }

    /// Metric key the score is recorded under.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Faithfulness => "faithfulness_score",
            Self::AnswerRelevance => "answer_relevance_score",
            Self::ContextRelevance => "context_relevance_score",
        }
    }

    /// Tag set to `"true"` when the metric fell back to [`UNSCOREABLE`].
    pub fn warning_tag(&self) -> String {
        format!("{}_parse_warning", self.key())
    }

    fn prompt(&self, question: &str, answer: &str, context: &str) -> String {
        match self {
            Self::Faithfulness => prompts::faithfulness_prompt(context, question, answer),
            Self::AnswerRelevance => prompts::answer_relevance_prompt(question, answer),
            Self::ContextRelevance => prompts::context_relevance_prompt(question, context),
        }
    }
}

/// The outcome of scoring one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeScore {
    pub metric: JudgeMetric,
    pub value: f64,
    /// Why the metric is unscoreable; `None` when `value` is a real score.
    pub failure: Option<RagError>,
}

impl JudgeScore {
    pub fn is_unscoreable(&self) -> bool {
        self.failure.is_some()
    }
}

/// Scores for all metrics of one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeScores(pub Vec<JudgeScore>);

impl JudgeScores {
    /// Metric key to value, always containing every metric.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.0
            .iter()
            .map(|s| (s.metric.key().to_string(), s.value))
            .collect()
    }

    pub fn get(&self, metric: JudgeMetric) -> Option<&JudgeScore> {
        self.0.iter().find(|s| s.metric == metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JudgeScore> {
        self.0.iter()
    }
}

/// Runs the judge model over an answer.
pub struct Judge {
    model: Arc<dyn ModelAdapter>,
}

impl Judge {
    pub fn new(model: Arc<dyn ModelAdapter>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Score a single metric. Never fails: problems become the sentinel.
    pub async fn score(
        &self,
        metric: JudgeMetric,
        question: &str,
        answer: &str,
        context: &str,
    ) -> JudgeScore {
        let prompt = metric.prompt(question, answer, context);
        let failure = match self.model.generate(&prompt).await {
            Ok(reply) => match parse_score(&reply) {
                Some(value) => {
                    debug!(metric = metric.name(), value, "Judge score parsed");
                    return JudgeScore {
                        metric,
                        value,
                        failure: None,
                    };
                }
                None => RagError::JudgeUnscoreable {
                    metric: metric.name().to_string(),
                    reason: format!("no score in [0.0, 1.0] found in reply {reply:?}"),
                },
            },
            Err(e) => RagError::JudgeUnscoreable {
                metric: metric.name().to_string(),
                reason: e.to_string(),
            },
        };
        warn!(metric = metric.name(), error = %failure, "Judge metric unscoreable");
        JudgeScore {
            metric,
            value: UNSCOREABLE,
            failure: Some(failure),
        }
    }

    /// Score every metric concurrently.
    pub async fn score_all(&self, question: &str, answer: &str, context: &str) -> JudgeScores {
        let scores = join_all(
            JudgeMetric::ALL
                .iter()
                .map(|metric| self.score(*metric, question, answer, context)),
        )
        .await;
        JudgeScores(scores)
    }
}
