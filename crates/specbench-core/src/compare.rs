//! Snapshot-to-snapshot comparison.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::domain::run::BenchmarkResult;
use crate::domain::semver::VersionChange;
use crate::domain::template::{NamedDependency, SpecialistTemplate};
use crate::snapshot::Snapshot;

/// A before/after pair of scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub before: Option<f64>,
    pub after: Option<f64>,
    /// `after - before`, when both sides are present.
    pub change: Option<f64>,
}

impl Delta {
    pub fn new(before: Option<f64>, after: Option<f64>) -> Self {
        let change = match (before, after) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        };
        Self {
            before,
            after,
            change,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreDelta {
    /// Overall mean weighted score.
    pub overall: Delta,
    /// Mean weighted score per model, over the union of both sides' models.
    pub per_model: BTreeMap<String, Delta>,
    /// Mean weighted score per capability tag, from attributed results.
    pub per_capability: BTreeMap<String, Delta>,
}

impl ScoreDelta {
    pub fn overall_change(&self) -> Option<f64> {
        self.overall.change
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Tool,
    Subagent,
    Plugin,
}

impl DependencyKind {
    fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Tool => "tool",
            DependencyKind::Subagent => "subagent",
            DependencyKind::Plugin => "plugin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum DependencyChange {
    Added {
        kind: DependencyKind,
        name: String,
        version: Option<String>,
    },
    Removed {
        kind: DependencyKind,
        name: String,
        version: Option<String>,
    },
    Updated {
        kind: DependencyKind,
        name: String,
        from: Option<String>,
        to: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateChanges {
    pub capabilities_added: Vec<String>,
    pub capabilities_removed: Vec<String>,
    pub prompts_added: Vec<String>,
    pub prompts_removed: Vec<String>,
    pub prompts_modified: Vec<String>,
    pub dependencies: Vec<DependencyChange>,
}

impl TemplateChanges {
    pub fn is_empty(&self) -> bool {
        self.capabilities_added.is_empty()
            && self.capabilities_removed.is_empty()
            && self.prompts_added.is_empty()
            && self.prompts_removed.is_empty()
            && self.prompts_modified.is_empty()
            && self.dependencies.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotComparison {
    pub name: String,
    pub version_before: String,
    pub version_after: String,
    pub version_change: VersionChange,
    pub score_delta: ScoreDelta,
    pub template_changes: TemplateChanges,
}

/// Compare snapshot `a` (before) with snapshot `b` (after).
pub fn compare(a: &Snapshot, b: &Snapshot) -> SnapshotComparison {
    let version_change = match (a.template().semver(), b.template().semver()) {
        (Some(va), Some(vb)) => VersionChange::between(&va, &vb),
        _ => VersionChange::None,
    };

    SnapshotComparison {
        name: b.name().to_string(),
        version_before: a.version().to_string(),
        version_after: b.version().to_string(),
        version_change,
        score_delta: score_delta(a, b),
        template_changes: template_changes(a.template(), b.template()),
    }
}

fn score_delta(a: &Snapshot, b: &Snapshot) -> ScoreDelta {
    let overall = Delta::new(
        a.aggregate().map(|g| g.overall_weighted),
        b.aggregate().map(|g| g.overall_weighted),
    );

    let model_scores = |s: &Snapshot| -> BTreeMap<String, f64> {
        s.aggregate()
            .map(|g| {
                g.per_model
                    .iter()
                    .map(|(m, stats)| (m.clone(), stats.mean_weighted_score))
                    .collect()
            })
            .unwrap_or_default()
    };

    ScoreDelta {
        overall,
        per_model: keyed_deltas(&model_scores(a), &model_scores(b)),
        per_capability: keyed_deltas(&capability_scores(a), &capability_scores(b)),
    }
}

fn keyed_deltas(
    before: &BTreeMap<String, f64>,
    after: &BTreeMap<String, f64>,
) -> BTreeMap<String, Delta> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .map(|k| {
            (
                k.clone(),
                Delta::new(before.get(k).copied(), after.get(k).copied()),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Capability attribution
// ---------------------------------------------------------------------------

fn normalise(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c.is_whitespace() { '-' } else { c })
        .collect()
}

fn fuzzy_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// The single capability tag `name` fuzzy-matches, if exactly one does.
fn unique_match<'t>(name: &str, tags: &[(&'t str, String)]) -> Result<&'t str, usize> {
    let name = normalise(name);
    let hits: Vec<&str> = tags
        .iter()
        .filter(|(_, norm)| fuzzy_match(&name, norm))
        .map(|(tag, _)| *tag)
        .collect();
    match hits.as_slice() {
        [only] => Ok(*only),
        _ => Err(hits.len()),
    }
}

/// Capability a result is attributed to: by scenario name, falling back to
/// suite name only when the scenario matches no tag. Ambiguous matches are
/// not attributed.
pub fn attribute_capability<'t>(result: &BenchmarkResult, tags: &'t [String]) -> Option<&'t str> {
    let tags: Vec<(&str, String)> = tags.iter().map(|t| (t.as_str(), normalise(t))).collect();
    match unique_match(&result.config.scenario, &tags) {
        Ok(tag) => Some(tag),
        Err(0) => unique_match(&result.config.suite, &tags).ok(),
        Err(_) => None,
    }
}

fn capability_scores(s: &Snapshot) -> BTreeMap<String, f64> {
    let tags: &[String] = s
        .template()
        .capabilities
        .as_ref()
        .map(|c| c.tags.as_slice())
        .unwrap_or_default();
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for result in s.results().unwrap_or_default().iter().filter(|r| r.success) {
        if let Some(tag) = attribute_capability(result, tags) {
            let entry = sums.entry(tag.to_string()).or_default();
            entry.0 += result.weighted_score;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(tag, (sum, n))| (tag, sum / n as f64))
        .collect()
}

// ---------------------------------------------------------------------------
// Template changes
// ---------------------------------------------------------------------------

fn set_diff<'a>(
    before: impl IntoIterator<Item = &'a String>,
    after: impl IntoIterator<Item = &'a String>,
) -> (Vec<String>, Vec<String>) {
    let before: BTreeSet<&String> = before.into_iter().collect();
    let after: BTreeSet<&String> = after.into_iter().collect();
    (
        after.difference(&before).map(|s| s.to_string()).collect(),
        before.difference(&after).map(|s| s.to_string()).collect(),
    )
}

fn named_changes(
    kind: DependencyKind,
    before: &[NamedDependency],
    after: &[NamedDependency],
    out: &mut Vec<DependencyChange>,
) {
    let before: BTreeMap<&str, &Option<String>> =
        before.iter().map(|d| (d.name.as_str(), &d.version)).collect();
    let after: BTreeMap<&str, &Option<String>> =
        after.iter().map(|d| (d.name.as_str(), &d.version)).collect();

    for (name, version) in &after {
        match before.get(name) {
            None => out.push(DependencyChange::Added {
                kind,
                name: name.to_string(),
                version: (*version).clone(),
            }),
            Some(old) if old != version => out.push(DependencyChange::Updated {
                kind,
                name: name.to_string(),
                from: (*old).clone(),
                to: (*version).clone(),
            }),
            Some(_) => {}
        }
    }
    for (name, version) in &before {
        if !after.contains_key(name) {
            out.push(DependencyChange::Removed {
                kind,
                name: name.to_string(),
                version: (*version).clone(),
            });
        }
    }
}

fn template_changes(a: &SpecialistTemplate, b: &SpecialistTemplate) -> TemplateChanges {
    let tags = |t: &SpecialistTemplate| {
        t.capabilities
            .as_ref()
            .map(|c| c.tags.clone())
            .unwrap_or_default()
    };
    let (tags_a, tags_b) = (tags(a), tags(b));
    let (capabilities_added, capabilities_removed) = set_diff(&tags_a, &tags_b);

    let prompts = |t: &SpecialistTemplate| {
        t.prompts
            .as_ref()
            .map(|p| p.default.clone())
            .unwrap_or_default()
    };
    let (prompts_a, prompts_b) = (prompts(a), prompts(b));
    let (prompts_added, prompts_removed) = set_diff(prompts_a.keys(), prompts_b.keys());
    let prompts_modified = prompts_a
        .iter()
        .filter(|(k, v)| prompts_b.get(*k).is_some_and(|after| after != *v))
        .map(|(k, _)| k.clone())
        .collect();

    let deps_a = a.dependencies.clone().unwrap_or_default();
    let deps_b = b.dependencies.clone().unwrap_or_default();
    let mut dependencies = Vec::new();
    let (tools_added, tools_removed) = set_diff(&deps_a.tools, &deps_b.tools);
    dependencies.extend(tools_added.into_iter().map(|name| DependencyChange::Added {
        kind: DependencyKind::Tool,
        name,
        version: None,
    }));
    dependencies.extend(tools_removed.into_iter().map(|name| DependencyChange::Removed {
        kind: DependencyKind::Tool,
        name,
        version: None,
    }));
    named_changes(
        DependencyKind::Subagent,
        &deps_a.subagents,
        &deps_b.subagents,
        &mut dependencies,
    );
    named_changes(
        DependencyKind::Plugin,
        &deps_a.plugins,
        &deps_b.plugins,
        &mut dependencies,
    );

    TemplateChanges {
        capabilities_added,
        capabilities_removed,
        prompts_added,
        prompts_removed,
        prompts_modified,
        dependencies,
    }
}

// ---------------------------------------------------------------------------
// Text report
// ---------------------------------------------------------------------------

fn score(v: Option<f64>) -> String {
    v.map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn delta_line(out: &mut String, label: &str, d: &Delta) {
    let change = d
        .change
        .map(|c| format!(" ({:+.3})", c))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "  {}: {} -> {}{}",
        label,
        score(d.before),
        score(d.after),
        change
    );
}

fn list_line(out: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        let _ = writeln!(out, "  {}: {}", label, items.join(", "));
    }
}

/// Render a comparison as plain text. Pure and deterministic.
pub fn format_report(c: &SnapshotComparison) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Snapshot comparison: {} {} -> {} ({})",
        c.name, c.version_before, c.version_after, c.version_change
    );

    out.push_str("\n[scores]\n");
    delta_line(&mut out, "overall weighted", &c.score_delta.overall);

    if !c.score_delta.per_model.is_empty() {
        out.push_str("\n[models]\n");
        for (model, d) in &c.score_delta.per_model {
            delta_line(&mut out, model, d);
        }
    }

    if !c.score_delta.per_capability.is_empty() {
        out.push_str("\n[capabilities]\n");
        for (tag, d) in &c.score_delta.per_capability {
            delta_line(&mut out, tag, d);
        }
    }

    out.push_str("\n[template]\n");
    let t = &c.template_changes;
    if t.is_empty() {
        out.push_str("  no changes\n");
    }
    list_line(&mut out, "capabilities added", &t.capabilities_added);
    list_line(&mut out, "capabilities removed", &t.capabilities_removed);
    list_line(&mut out, "prompts added", &t.prompts_added);
    list_line(&mut out, "prompts removed", &t.prompts_removed);
    list_line(&mut out, "prompts modified", &t.prompts_modified);
    for change in &t.dependencies {
        let line = match change {
            DependencyChange::Added {
                kind,
                name,
                version,
            } => format!("+ {} {}{}", kind.as_str(), name, at(version)),
            DependencyChange::Removed {
                kind,
                name,
                version,
            } => format!("- {} {}{}", kind.as_str(), name, at(version)),
            DependencyChange::Updated {
                kind,
                name,
                from,
                to,
            } => format!(
                "~ {} {}: {} -> {}",
                kind.as_str(),
                name,
                from.as_deref().unwrap_or("unversioned"),
                to.as_deref().unwrap_or("unversioned")
            ),
        };
        let _ = writeln!(out, "  {}", line);
    }

    out
}

fn at(version: &Option<String>) -> String {
    version
        .as_deref()
        .map(|v| format!("@{}", v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::{BenchmarkConfig, ModelAssignment};
    use crate::domain::template::{Capabilities, Dependencies, Prompts};

    fn result(suite: &str, scenario: &str) -> BenchmarkResult {
        let config = BenchmarkConfig {
            suite: suite.to_string(),
            suite_type: "implementation".to_string(),
            scenario: scenario.to_string(),
            tier: "L1".to_string(),
            models: vec![ModelAssignment::new("gpt-4o", 1.0, 1.0)],
        };
        let model = config.models[0].clone();
        BenchmarkResult::succeeded(config, model, 5.0, 1)
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_attribution_normalises_and_matches_substrings() {
        let t = tags(&["API Design", "testing"]);
        assert_eq!(
            attribute_capability(&result("x", "rest_api_design_basics"), &t),
            Some("API Design")
        );
        assert_eq!(
            attribute_capability(&result("x", "Testing"), &t),
            Some("testing")
        );
    }

    #[test]
    fn test_attribution_falls_back_to_suite() {
        let t = tags(&["frontend", "databases"]);
        assert_eq!(
            attribute_capability(&result("frontend-suite", "todo-app"), &t),
            Some("frontend")
        );
    }

    #[test]
    fn test_ambiguous_or_unmatched_excluded() {
        let t = tags(&["api", "api-design"]);
        assert_eq!(attribute_capability(&result("x", "api-design-l1"), &t), None);
        assert_eq!(attribute_capability(&result("misc", "todo"), &t), None);
    }

    #[test]
    fn test_ambiguous_scenario_does_not_fall_back() {
        let t = tags(&["auth", "oauth", "backend"]);
        assert_eq!(attribute_capability(&result("backend", "oauth"), &t), None);
    }

    fn template(
        tags_: &[&str],
        prompts: &[(&str, &str)],
        deps: Dependencies,
    ) -> SpecialistTemplate {
        SpecialistTemplate {
            capabilities: Some(Capabilities {
                tags: tags(tags_),
                ..Default::default()
            }),
            prompts: Some(Prompts {
                default: prompts
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            }),
            dependencies: Some(deps),
            ..Default::default()
        }
    }

    fn dep(name: &str, version: Option<&str>) -> NamedDependency {
        NamedDependency {
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    #[test]
    fn test_template_changes() {
        let a = template(
            &["api", "testing"],
            &[("system", "v1"), ("review", "same"), ("old", "x")],
            Dependencies {
                tools: tags(&["git", "cargo"]),
                subagents: vec![dep("linter", Some("1.0")), dep("gone", None)],
                plugins: vec![],
            },
        );
        let b = template(
            &["api", "security"],
            &[("system", "v2"), ("review", "same"), ("new", "y")],
            Dependencies {
                tools: tags(&["git", "docker"]),
                subagents: vec![dep("linter", Some("1.1"))],
                plugins: vec![dep("mcp-fs", Some("0.3"))],
            },
        );

        let c = template_changes(&a, &b);
        assert_eq!(c.capabilities_added, tags(&["security"]));
        assert_eq!(c.capabilities_removed, tags(&["testing"]));
        assert_eq!(c.prompts_added, tags(&["new"]));
        assert_eq!(c.prompts_removed, tags(&["old"]));
        assert_eq!(c.prompts_modified, tags(&["system"]));
        assert_eq!(
            c.dependencies,
            vec![
                DependencyChange::Added {
                    kind: DependencyKind::Tool,
                    name: "docker".to_string(),
                    version: None
                },
                DependencyChange::Removed {
                    kind: DependencyKind::Tool,
                    name: "cargo".to_string(),
                    version: None
                },
                DependencyChange::Updated {
                    kind: DependencyKind::Subagent,
                    name: "linter".to_string(),
                    from: Some("1.0".to_string()),
                    to: Some("1.1".to_string())
                },
                DependencyChange::Removed {
                    kind: DependencyKind::Subagent,
                    name: "gone".to_string(),
                    version: None
                },
                DependencyChange::Added {
                    kind: DependencyKind::Plugin,
                    name: "mcp-fs".to_string(),
                    version: Some("0.3".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_identical_templates_have_no_changes() {
        let a = template(&["api"], &[("system", "v1")], Dependencies::default());
        assert!(template_changes(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_keyed_deltas_union() {
        let before: BTreeMap<String, f64> = [("a".to_string(), 1.0), ("b".to_string(), 2.0)].into();
        let after: BTreeMap<String, f64> = [("b".to_string(), 2.5), ("c".to_string(), 3.0)].into();
        let d = keyed_deltas(&before, &after);
        assert_eq!(d.len(), 3);
        assert_eq!(d["a"].change, None);
        assert_eq!(d["b"].change, Some(0.5));
        assert_eq!(d["c"].before, None);
    }
}
