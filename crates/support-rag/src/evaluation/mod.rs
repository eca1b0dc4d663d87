//! Keyword-based answer quality evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::generation::QueryKind;
use crate::pipeline::{QueryOutcome, RagPipeline};

/// Responses at or below this length are not considered helpful
const HELPFUL_MIN_CHARS: usize = 50;

/// Keyword hit ratio above which an answer counts as a success
pub const SUCCESS_THRESHOLD: f64 = 0.5;

/// One evaluation question with the keywords a good answer mentions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvalCase {
    pub question: String,
    pub category: String,
    pub expected_keywords: Vec<String>,
}

impl EvalCase {
    fn new(question: &str, category: &str, keywords: &[&str]) -> Self {
        Self {
            question: question.to_string(),
            category: category.to_string(),
            expected_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Built-in question set for the Home Essentials knowledge base
    pub fn default_set() -> Vec<EvalCase> {
        vec![
            Self::new(
                "What is the return policy for small electronics?",
                "policy",
                &["60-day", "return", "original condition", "RMA"],
            ),
            Self::new(
                "How do I set up the Smart Thermostat 300?",
                "technical",
                &["C-wire", "breaker", "HomeCentral", "app"],
            ),
            Self::new(
                "Tell me about the Smart Refrigerator specifications",
                "product",
                &["AP-FRZ-100", "21-inch", "touchscreen", "$2,899"],
            ),
            Self::new(
                "My security camera won't connect to WiFi",
                "troubleshooting",
                &["2.4 GHz", "MAC filtering", "reset", "15 seconds"],
            ),
            Self::new(
                "What payment methods do you accept?",
                "policy",
                &["Visa", "Mastercard", "Affirm", "$500"],
            ),
            Self::new(
                "How do I cancel my order?",
                "policy",
                &["2 hours", "small electronics", "$150", "cancellation fee"],
            ),
            Self::new(
                "What is the warranty on the Smart Washing Machine?",
                "product",
                &["1-year", "warranty", "extended", "3-year"],
            ),
            Self::new(
                "How do I fix excessive vibration on my washing machine?",
                "troubleshooting",
                &["shipping bolts", "leveling feet", "level"],
            ),
        ]
    }

    /// Load cases from a JSON array
    pub fn load(path: &Path) -> Result<Vec<EvalCase>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Quality signals for a single response
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseScore {
    /// Fraction of expected keywords present (case-insensitive)
    pub keyword_score: f64,
    pub found_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub has_helpful_info: bool,
    /// False when the response reads like an apology for an error
    pub not_error: bool,
    pub response_length: usize,
}

impl ResponseScore {
    pub fn is_success(&self) -> bool {
        self.keyword_score > SUCCESS_THRESHOLD
    }
}

/// Score a response against its expected keywords
pub fn score_response(response: &str, expected_keywords: &[String]) -> ResponseScore {
    let lower = response.to_lowercase();
    let (found, missing): (Vec<String>, Vec<String>) = expected_keywords
        .iter()
        .cloned()
        .partition(|kw| lower.contains(&kw.to_lowercase()));

    let keyword_score = if expected_keywords.is_empty() {
        0.0
    } else {
        found.len() as f64 / expected_keywords.len() as f64
    };
    let response_length = response.chars().count();

    ResponseScore {
        keyword_score,
        found_keywords: found,
        missing_keywords: missing,
        has_helpful_info: response_length > HELPFUL_MIN_CHARS,
        not_error: !(lower.contains("error") && lower.contains("apologize")),
        response_length,
    }
}

/// One evaluated question
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub question: String,
    pub category: String,
    pub response: String,
    pub latency_ms: u64,
    pub num_chunks: usize,
    pub relevance_scores: Vec<f32>,
    pub evaluation: ResponseScore,
}

impl CaseResult {
    pub fn from_outcome(case: &EvalCase, outcome: QueryOutcome) -> Self {
        let evaluation = score_response(&outcome.response, &case.expected_keywords);
        Self {
            question: case.question.clone(),
            category: case.category.clone(),
            num_chunks: outcome.num_chunks(),
            latency_ms: outcome.latency_ms,
            relevance_scores: outcome.scores,
            response: outcome.response,
            evaluation,
        }
    }
}

/// Aggregates over all evaluated questions
#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub total_questions: usize,
    pub average_keyword_score: f64,
    /// Share of questions with a keyword score above [`SUCCESS_THRESHOLD`]
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub total_latency_ms: u64,
    /// Average keyword score per category, sorted by category name
    pub category_scores: BTreeMap<String, f64>,
}

impl EvalSummary {
    pub fn from_results(results: &[CaseResult]) -> Self {
        let total = results.len();
        let denominator = total.max(1) as f64;
        let total_latency_ms: u64 = results.iter().map(|r| r.latency_ms).sum();

        let mut per_category: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for result in results {
            let entry = per_category.entry(result.category.clone()).or_insert((0.0, 0));
            entry.0 += result.evaluation.keyword_score;
            entry.1 += 1;
        }

        Self {
            total_questions: total,
            average_keyword_score: results.iter().map(|r| r.evaluation.keyword_score).sum::<f64>()
                / denominator,
            success_rate: results.iter().filter(|r| r.evaluation.is_success()).count() as f64
                / denominator,
            average_latency_ms: total_latency_ms as f64 / denominator,
            total_latency_ms,
            category_scores: per_category
                .into_iter()
                .map(|(category, (sum, count))| (category, sum / count as f64))
                .collect(),
        }
    }
}

/// Report written to disk after an evaluation run
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub generated_at: DateTime<Utc>,
    pub summary: EvalSummary,
    pub results: Vec<CaseResult>,
}

impl EvalReport {
    /// Write as pretty JSON, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!("Evaluation results saved to {}", path.display());
        Ok(())
    }
}

/// Ask every case as a stateless question and score the answers
pub async fn run_evaluation<F>(pipeline: &RagPipeline, cases: &[EvalCase], mut on_result: F) -> EvalReport
where
    F: FnMut(usize, &CaseResult),
{
    let mut results = Vec::with_capacity(cases.len());

    for (i, case) in cases.iter().enumerate() {
        let outcome = pipeline.ask(&case.question, QueryKind::General).await;
        let result = CaseResult::from_outcome(case, outcome);
        tracing::debug!(
            question = %case.question,
            keyword_score = result.evaluation.keyword_score,
            "Evaluated question"
        );
        on_result(i, &result);
        results.push(result);
    }

    EvalReport {
        generated_at: Utc::now(),
        summary: EvalSummary::from_results(&results),
        results,
    }
}
