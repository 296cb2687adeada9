//! Filesystem discovery of scenarios and tiers.
//!
//! Layout of a suite root:
//!
//! ```text
//! <suite>/scenarios/<scenario>/...        one directory per scenario
//! <suite>/prompts/<scenario>/<Tier>.md    one prompt file per tier
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A scenario or suite that was skipped. Never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryWarning {
    pub suite_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub message: String,
}

impl fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scenario {
            Some(scenario) => write!(
                f,
                "{} [{}]: {}",
                self.suite_root.display(),
                scenario,
                self.message
            ),
            None => write!(f, "{}: {}", self.suite_root.display(), self.message),
        }
    }
}

/// A scenario together with its discovered tiers (sorted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioTiers {
    pub name: String,
    pub tiers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteDiscovery {
    pub scenarios: Vec<ScenarioTiers>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// Discover the scenarios of one suite and the tiers of each scenario.
///
/// Scenarios without any tier file matching `tier_pattern` are skipped with
/// a warning. A missing `scenarios/` directory yields an empty discovery
/// with a warning.
pub fn discover_suite(suite_root: &Path, tier_pattern: &Regex) -> SuiteDiscovery {
    let mut warnings = Vec::new();

    let scenario_names = match list_entries(&suite_root.join("scenarios"), true) {
        Ok(names) => names,
        Err(e) => {
            skip(
                &mut warnings,
                suite_root,
                None,
                format!("cannot read scenarios directory: {}", e),
            );
            return SuiteDiscovery {
                scenarios: Vec::new(),
                warnings,
            };
        }
    };

    let mut scenarios = Vec::new();
    for scenario in scenario_names {
        let prompt_dir = suite_root.join("prompts").join(&scenario);
        let tiers: Vec<String> = match list_entries(&prompt_dir, false) {
            Ok(files) => files
                .iter()
                .filter_map(|file| file.strip_suffix(".md"))
                .filter(|stem| tier_pattern.is_match(stem))
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };

        if tiers.is_empty() {
            skip(
                &mut warnings,
                suite_root,
                Some(&scenario),
                format!("no tier prompts found under {}", prompt_dir.display()),
            );
            continue;
        }
        scenarios.push(ScenarioTiers {
            name: scenario,
            tiers,
        });
    }

    SuiteDiscovery {
        scenarios,
        warnings,
    }
}

fn skip(
    warnings: &mut Vec<DiscoveryWarning>,
    suite_root: &Path,
    scenario: Option<&str>,
    message: String,
) {
    let warning = DiscoveryWarning {
        suite_root: suite_root.to_path_buf(),
        scenario: scenario.map(str::to_string),
        message,
    };
    warn!(warning = %warning, "benchmark discovery skipped an entry");
    warnings.push(warning);
}

/// Sorted names of the directories (`dirs == true`) or files in `dir`,
/// hidden entries excluded.
fn list_entries(dir: &Path, dirs: bool) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() != dirs {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
