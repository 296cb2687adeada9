//! Score aggregation and run reports.
//!
//! Means are taken over successful results only; failures are counted
//! separately so infrastructure flakiness does not read as low model quality.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::run::BenchmarkResult;
use crate::domain::template::ResolvedTemplate;

/// Overall pass rate below which a warning is raised.
pub const PASS_RATE_THRESHOLD: f64 = 0.70;
/// Per-type success rate below which a warning is raised.
pub const TYPE_SUCCESS_THRESHOLD: f64 = 0.60;
/// Mean per-benchmark duration above which a warning is raised.
pub const SLOW_BENCHMARK_MS: f64 = 120_000.0;
/// Size of the declared vs empirical model ranking comparison.
pub const TOP_K: usize = 3;

/// Statistics for one group of results (a model or a benchmark type).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupStats {
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub mean_score: f64,
    pub mean_weighted_score: f64,
    pub total_duration_ms: u64,
}

#[derive(Default)]
struct Accumulator {
    attempts: usize,
    successes: usize,
    raw_sum: f64,
    weighted_sum: f64,
    duration_ms: u64,
}

impl Accumulator {
    fn add(&mut self, result: &BenchmarkResult) {
        self.attempts += 1;
        self.duration_ms += result.duration_ms;
        if result.success {
            self.successes += 1;
            self.raw_sum += result.raw_score;
            self.weighted_sum += result.weighted_score;
        }
    }

    fn finish(&self) -> GroupStats {
        GroupStats {
            attempts: self.attempts,
            successes: self.successes,
            success_rate: ratio(self.successes as f64, self.attempts),
            mean_score: ratio(self.raw_sum, self.successes),
            mean_weighted_score: ratio(self.weighted_sum, self.successes),
            total_duration_ms: self.duration_ms,
        }
    }
}

fn ratio(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Derived scores for a set of results. Recomputable at any time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedScore {
    /// Mean raw score of successful results.
    pub overall_score: f64,
    /// Mean weighted score of successful results.
    pub overall_weighted: f64,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_duration_ms: u64,
    pub per_model: BTreeMap<String, GroupStats>,
    /// Keyed by declared suite type.
    pub per_type: BTreeMap<String, GroupStats>,
}

/// Aggregate results. Models the template declares but that produced no
/// results still get a (zeroed) per-model entry.
pub fn aggregate(results: &[BenchmarkResult], template: &ResolvedTemplate) -> AggregatedScore {
    let mut overall = Accumulator::default();
    let mut per_model: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut per_type: BTreeMap<String, Accumulator> = BTreeMap::new();

    for pm in &template.preferred_models {
        per_model.entry(pm.model.clone()).or_default();
    }
    for result in results {
        overall.add(result);
        per_model
            .entry(result.model.model.clone())
            .or_default()
            .add(result);
        per_type
            .entry(result.config.suite_type.clone())
            .or_default()
            .add(result);
    }

    let stats = overall.finish();
    AggregatedScore {
        overall_score: stats.mean_score,
        overall_weighted: stats.mean_weighted_score,
        total: stats.attempts,
        successful: stats.successes,
        failed: stats.attempts - stats.successes,
        success_rate: stats.success_rate,
        total_duration_ms: stats.total_duration_ms,
        per_model: per_model.iter().map(|(k, a)| (k.clone(), a.finish())).collect(),
        per_type: per_type.iter().map(|(k, a)| (k.clone(), a.finish())).collect(),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    BestModel,
    LowPassRate,
    WeakBenchmarkType,
    ModelRankingMismatch,
    SlowBenchmarks,
}

/// Advisory finding. Never blocks snapshotting or storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub severity: Severity,
    pub message: String,
}

impl Recommendation {
    fn info(kind: RecommendationKind, message: String) -> Self {
        Self {
            kind,
            severity: Severity::Info,
            message,
        }
    }

    fn warning(kind: RecommendationKind, message: String) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub template: String,
    pub version: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub overall_score: f64,
    pub overall_weighted: f64,
    pub mean_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelPerformance {
    pub model: String,
    /// Weight from `preferred_models`, absent for undeclared models.
    pub declared_weight: Option<f64>,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeAnalysis {
    pub suite_type: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Sorted by mean weighted score, best first.
    pub model_performance: Vec<ModelPerformance>,
    pub type_analysis: Vec<TypeAnalysis>,
    pub recommendations: Vec<Recommendation>,
    pub results: Vec<BenchmarkResult>,
}

pub fn generate_report(results: &[BenchmarkResult], template: &ResolvedTemplate) -> RunReport {
    let agg = aggregate(results, template);
    let declared: BTreeMap<&str, f64> = template
        .preferred_models
        .iter()
        .map(|pm| (pm.model.as_str(), pm.weight))
        .collect();

    let mut model_performance: Vec<ModelPerformance> = agg
        .per_model
        .iter()
        .map(|(model, stats)| ModelPerformance {
            model: model.clone(),
            declared_weight: declared.get(model.as_str()).copied(),
            stats: stats.clone(),
        })
        .collect();
    model_performance.sort_by(|a, b| {
        b.stats
            .mean_weighted_score
            .total_cmp(&a.stats.mean_weighted_score)
            .then_with(|| a.model.cmp(&b.model))
    });

    let type_analysis = agg
        .per_type
        .iter()
        .map(|(suite_type, stats)| TypeAnalysis {
            suite_type: suite_type.clone(),
            stats: stats.clone(),
        })
        .collect();

    let mean_duration_ms = ratio(agg.total_duration_ms as f64, agg.total);
    let recommendations = recommend(&agg, &model_performance, template, mean_duration_ms);

    RunReport {
        summary: RunSummary {
            template: template.name.clone(),
            version: template.version.clone(),
            total: agg.total,
            successful: agg.successful,
            failed: agg.failed,
            success_rate: agg.success_rate,
            overall_score: agg.overall_score,
            overall_weighted: agg.overall_weighted,
            mean_duration_ms,
        },
        model_performance,
        type_analysis,
        recommendations,
        results: results.to_vec(),
    }
}

fn recommend(
    agg: &AggregatedScore,
    ranked: &[ModelPerformance],
    template: &ResolvedTemplate,
    mean_duration_ms: f64,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if agg.total == 0 {
        return out;
    }

    // `ranked` is best-first; only models with at least one success count.
    let empirical: Vec<&ModelPerformance> =
        ranked.iter().filter(|m| m.stats.successes > 0).collect();

    if let Some(best) = empirical.first() {
        out.push(Recommendation::info(
            RecommendationKind::BestModel,
            format!(
                "{} has the best mean weighted score ({:.2})",
                best.model, best.stats.mean_weighted_score
            ),
        ));
    }

    if agg.success_rate < PASS_RATE_THRESHOLD {
        out.push(Recommendation::warning(
            RecommendationKind::LowPassRate,
            format!(
                "overall pass rate {:.0}% is below {:.0}%",
                agg.success_rate * 100.0,
                PASS_RATE_THRESHOLD * 100.0
            ),
        ));
    }

    for (suite_type, stats) in &agg.per_type {
        if stats.success_rate < TYPE_SUCCESS_THRESHOLD {
            out.push(Recommendation::warning(
                RecommendationKind::WeakBenchmarkType,
                format!(
                    "benchmark type '{}' succeeded in {:.0}% of runs (below {:.0}%)",
                    suite_type,
                    stats.success_rate * 100.0,
                    TYPE_SUCCESS_THRESHOLD * 100.0
                ),
            ));
        }
    }

    let mut declared: Vec<(&str, f64)> = template
        .preferred_models
        .iter()
        .map(|pm| (pm.model.as_str(), pm.weight))
        .collect();
    declared.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let k = TOP_K.min(declared.len()).min(empirical.len());
    if k > 0 {
        let declared_top: BTreeSet<&str> = declared.iter().take(k).map(|(m, _)| *m).collect();
        let empirical_top: BTreeSet<&str> =
            empirical.iter().take(k).map(|m| m.model.as_str()).collect();
        if declared_top != empirical_top {
            out.push(Recommendation::warning(
                RecommendationKind::ModelRankingMismatch,
                format!(
                    "declared top {} models [{}] differ from measured top {} [{}]; consider reweighting preferred_models",
                    k,
                    join(&declared_top),
                    k,
                    join(&empirical_top)
                ),
            ));
        }
    }

    if mean_duration_ms > SLOW_BENCHMARK_MS {
        out.push(Recommendation::warning(
            RecommendationKind::SlowBenchmarks,
            format!(
                "mean benchmark duration {:.1}s exceeds {:.0}s",
                mean_duration_ms / 1000.0,
                SLOW_BENCHMARK_MS / 1000.0
            ),
        ));
    }

    out
}

fn join(models: &BTreeSet<&str>) -> String {
    models.iter().copied().collect::<Vec<_>>().join(", ")
}

/// Render a run report as markdown.
pub fn render_report_md(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!("# Benchmark Report: {} v{}\n\n", s.template, s.version));
    out.push_str("## Summary\n");
    out.push_str(&format!(
        "- executions: {}\n- successful: {}\n- failed: {}\n- pass rate: {:.1}%\n- overall score: {:.2}\n- overall weighted: {:.3}\n- mean duration: {:.1}s\n\n",
        s.total,
        s.successful,
        s.failed,
        s.success_rate * 100.0,
        s.overall_score,
        s.overall_weighted,
        s.mean_duration_ms / 1000.0
    ));

    if !report.model_performance.is_empty() {
        out.push_str("## Models\n");
        out.push_str("| model | declared weight | runs | pass rate | mean score | mean weighted |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for m in &report.model_performance {
            let weight = m
                .declared_weight
                .map(|w| format!("{:.2}", w))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "| {} | {} | {} | {:.1}% | {:.2} | {:.3} |\n",
                m.model,
                weight,
                m.stats.attempts,
                m.stats.success_rate * 100.0,
                m.stats.mean_score,
                m.stats.mean_weighted_score
            ));
        }
        out.push('\n');
    }

    if !report.type_analysis.is_empty() {
        out.push_str("## Benchmark Types\n");
        for t in &report.type_analysis {
            out.push_str(&format!(
                "- `{}`: {}/{} passed, mean score {:.2}\n",
                t.suite_type, t.stats.successes, t.stats.attempts, t.stats.mean_score
            ));
        }
        out.push('\n');
    }

    if !report.recommendations.is_empty() {
        out.push_str("## Recommendations\n");
        for r in &report.recommendations {
            let tag = match r.severity {
                Severity::Info => "info",
                Severity::Warning => "warning",
            };
            out.push_str(&format!("- **{}**: {}\n", tag, r.message));
        }
    }

    out
}
