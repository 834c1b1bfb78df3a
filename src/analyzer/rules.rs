//! Ordered framework detection rules.
//!
//! Rules are evaluated top to bottom and the first match wins, so
//! meta-frameworks must appear before the base libraries they build on.

use crate::analyzer::types::{
    GENERIC_FRAMEWORK, GENERIC_SCORE, PlatformScores, UNKNOWN_FRAMEWORK, UNKNOWN_SCORE,
    uniform_scores,
};
use crate::platform::Platform;
use std::collections::BTreeSet;

/// How a rule decides whether a dependency set matches
#[derive(Debug, Clone, Copy)]
pub enum Predicate {
    /// Any of the named packages is present
    Any(&'static [&'static str]),
    /// A package with this scope or prefix is present
    Prefix(&'static str),
}

impl Predicate {
    pub fn matches(&self, dependencies: &BTreeSet<String>) -> bool {
        match self {
            Predicate::Any(names) => names.iter().any(|name| dependencies.contains(*name)),
            Predicate::Prefix(prefix) => dependencies.iter().any(|dep| dep.starts_with(prefix)),
        }
    }
}

/// A named framework with its per-platform scores
#[derive(Debug, Clone, Copy)]
pub struct FrameworkRule {
    pub name: &'static str,
    pub predicate: Predicate,
    /// Scores in [`Platform::ALL`] order
    pub scores: [u8; 6],
}

impl FrameworkRule {
    pub fn score_table(&self) -> PlatformScores {
        Platform::ALL
            .iter()
            .copied()
            .zip(self.scores.iter().copied())
            .collect()
    }
}

// vercel, netlify, cloudflare, aws, azure, gcp
pub static FRAMEWORK_RULES: &[FrameworkRule] = &[
    FrameworkRule {
        name: "next.js",
        predicate: Predicate::Any(&["next"]),
        scores: [100, 85, 75, 80, 70, 75],
    },
    FrameworkRule {
        name: "nuxt",
        predicate: Predicate::Any(&["nuxt", "nuxt3"]),
        scores: [95, 90, 85, 75, 70, 70],
    },
    FrameworkRule {
        name: "gatsby",
        predicate: Predicate::Any(&["gatsby"]),
        scores: [90, 100, 85, 75, 75, 65],
    },
    FrameworkRule {
        name: "remix",
        predicate: Predicate::Prefix("@remix-run/"),
        scores: [90, 85, 95, 75, 70, 75],
    },
    FrameworkRule {
        name: "sveltekit",
        predicate: Predicate::Any(&["@sveltejs/kit"]),
        scores: [95, 90, 90, 75, 70, 70],
    },
    FrameworkRule {
        name: "astro",
        predicate: Predicate::Any(&["astro"]),
        scores: [90, 95, 95, 75, 75, 65],
    },
    FrameworkRule {
        name: "angular",
        predicate: Predicate::Any(&["@angular/core"]),
        scores: [85, 85, 80, 85, 90, 80],
    },
    FrameworkRule {
        name: "nestjs",
        predicate: Predicate::Any(&["@nestjs/core"]),
        scores: [60, 40, 40, 90, 90, 95],
    },
    FrameworkRule {
        name: "vite",
        predicate: Predicate::Any(&["vite"]),
        scores: [90, 95, 90, 80, 80, 70],
    },
    FrameworkRule {
        name: "create-react-app",
        predicate: Predicate::Any(&["react-scripts"]),
        scores: [90, 90, 85, 85, 80, 70],
    },
    FrameworkRule {
        name: "react",
        predicate: Predicate::Any(&["react"]),
        scores: [90, 90, 85, 80, 80, 70],
    },
    FrameworkRule {
        name: "vue",
        predicate: Predicate::Any(&["vue"]),
        scores: [85, 90, 85, 80, 80, 70],
    },
    FrameworkRule {
        name: "svelte",
        predicate: Predicate::Any(&["svelte"]),
        scores: [85, 90, 85, 75, 75, 70],
    },
    FrameworkRule {
        name: "express",
        predicate: Predicate::Any(&["express"]),
        scores: [60, 40, 45, 85, 85, 90],
    },
];

/// Framework name and scores for a dependency set
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub framework: String,
    pub scores: PlatformScores,
}

/// Merge the `dependencies` and `devDependencies` keys of a parsed manifest
pub fn collect_dependencies(manifest: &serde_json::Value) -> BTreeSet<String> {
    ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|section| manifest.get(*section).and_then(|deps| deps.as_object()))
        .flat_map(|deps| deps.keys())
        .map(|name| name.to_lowercase())
        .collect()
}

/// Apply the ordered rule table to a dependency set
pub fn classify(dependencies: &BTreeSet<String>) -> Classification {
    if let Some(rule) = FRAMEWORK_RULES
        .iter()
        .find(|rule| rule.predicate.matches(dependencies))
    {
        return Classification {
            framework: rule.name.to_string(),
            scores: rule.score_table(),
        };
    }

    if dependencies.is_empty() {
        Classification {
            framework: UNKNOWN_FRAMEWORK.to_string(),
            scores: uniform_scores(UNKNOWN_SCORE),
        }
    } else {
        Classification {
            framework: GENERIC_FRAMEWORK.to_string(),
            scores: uniform_scores(GENERIC_SCORE),
        }
    }
}
