//! Rule engine for deterministic transaction classification
//!
//! Rules are compiled once when the set is loaded (regex patterns in
//! particular are never rebuilt per match attempt) and applied against the
//! normalized description. When several rules match, the winner is chosen
//! deterministically: lowest `order` first, then lexicographically smallest
//! `category_id`.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ClassificationRule, MatchKind};
use crate::normalize::normalize;

/// A rule with its pattern compiled for repeated matching
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: ClassificationRule,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Compiled case-insensitively, tested against the normalized text
    Regex(Regex),
    /// Normalized pattern for substring/prefix/suffix tests
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

impl CompiledRule {
    fn compile(rule: ClassificationRule) -> Result<Self> {
        let matcher = match rule.match_kind {
            MatchKind::Regex => {
                let re = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        Error::Rule(format!("invalid regex \"{}\": {}", rule.pattern, e))
                    })?;
                Matcher::Regex(re)
            }
            MatchKind::Contains => Matcher::Contains(normalize(&rule.pattern)),
            MatchKind::StartsWith => Matcher::StartsWith(normalize(&rule.pattern)),
            MatchKind::EndsWith => Matcher::EndsWith(normalize(&rule.pattern)),
        };

        if let Matcher::Contains(p) | Matcher::StartsWith(p) | Matcher::EndsWith(p) = &matcher {
            if p.is_empty() {
                return Err(Error::Rule(format!(
                    "pattern \"{}\" normalizes to nothing",
                    rule.pattern
                )));
            }
        }

        Ok(Self { rule, matcher })
    }

    /// Test against an already-normalized description
    fn matches_normalized(&self, description: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(description),
            Matcher::Contains(p) => description.contains(p.as_str()),
            Matcher::StartsWith(p) => description.starts_with(p.as_str()),
            Matcher::EndsWith(p) => description.ends_with(p.as_str()),
        }
    }
}

/// Result of a rule hit
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub category_id: String,
    pub tags: Option<Vec<String>>,
    /// Human-readable trace citing the rule's order and pattern
    pub reason: String,
}

/// An ordered set of compiled classification rules, read-only per invocation
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile a rule list. Invalid patterns fail here, at load time.
    pub fn compile(rules: Vec<ClassificationRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        debug!(rules = rules.len(), "Compiled rule set");
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules matching a description, in declaration order.
    /// Useful for rule previews and debugging.
    pub fn matches(&self, description: &str) -> Vec<&CompiledRule> {
        let normalized = normalize(description);
        self.rules
            .iter()
            .filter(|r| r.matches_normalized(&normalized))
            .collect()
    }

    /// Apply the rule set to a description.
    ///
    /// Collects every matching rule and picks the winner by `order`
    /// ascending, then `category_id` lexicographically ascending. Returns
    /// None when nothing matches so the cache/AI fallback can proceed.
    pub fn apply(&self, description: &str) -> Option<RuleMatch> {
        let mut matched = self.matches(description);
        if matched.is_empty() {
            return None;
        }

        matched.sort_by(|a, b| {
            a.rule
                .order
                .cmp(&b.rule.order)
                .then_with(|| a.rule.category_id.cmp(&b.rule.category_id))
        });

        let winner = &matched[0].rule;
        debug!(
            order = winner.order,
            pattern = %winner.pattern,
            category = %winner.category_id,
            "Rule matched"
        );

        Some(RuleMatch {
            category_id: winner.category_id.clone(),
            tags: winner.tags.clone(),
            reason: format!(
                "matched rule #{} ({} \"{}\")",
                winner.order,
                winner.match_kind.as_str(),
                winner.pattern
            ),
        })
    }
}
