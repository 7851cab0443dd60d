//! # Ingredient Matcher
//!
//! Binds a free-text ingredient name ("tavuk göğsü fileto") to the
//! specification rule that governs it.
//!
//! ## Matching Policy
//!
//! 1. **Keyword proposal**: every dictionary entry whose keywords occur in the
//!    name becomes a candidate, scored by its longest matching keyword.
//!    Candidates are ranked by score, then by material-type label length,
//!    both descending; remaining ties keep dictionary order.
//! 2. **Binding**: the first candidate with a rule of the same material type in
//!    the subtype-scoped rules wins.
//! 3. **Direct match**: otherwise the name is compared against rule labels:
//!    exact equality first, then containment. Labels of three characters or
//!    fewer must match on word boundaries; the longest matching label wins.
//! 4. Steps 2-3 are repeated against the full rule list.
//!
//! All comparisons run on lower-cased, trimmed text. Lengths are counted in
//! characters, not bytes.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::{debug, trace, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::reconcile_model::{KeywordEntry, SpecificationRule};

/// Labels this short need word boundaries to match
pub const SHORT_LABEL_MAX_CHARS: usize = 3;

lazy_static! {
    /// Compiled word-boundary patterns, keyed by short label
    static ref SHORT_LABEL_PATTERNS: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

/// Lower-case and trim a name, label or keyword for comparison
pub fn normalize_name(text: &str) -> String {
    text.trim().to_lowercase()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// A material type proposed by the keyword dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub material_type: String,
    /// Length of the longest keyword found in the name
    pub score: usize,
}

/// Which search step produced a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// Keyword candidate bound to a subtype-scoped rule
    Subtype,
    /// Direct label match among subtype-scoped rules
    SubtypeDirect,
    /// Keyword candidate bound to any rule of the specification
    Fallback,
    /// Direct label match among all rules of the specification
    FallbackDirect,
}

/// A rule bound to an ingredient name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch<'r> {
    pub rule: &'r SpecificationRule,
    pub scope: MatchScope,
}

/// Score every dictionary entry against an ingredient name
///
/// Returns the ranked candidate list; entries with no matching keyword are
/// left out.
///
/// # Examples
///
/// ```rust
/// use recipe_reconciler::ingredient_matcher::score_candidates;
/// use recipe_reconciler::reconcile_model::KeywordEntry;
///
/// let dictionary = vec![
///     KeywordEntry::new("Tavuk", &["tavuk"]),
///     KeywordEntry::new("Tavuk Göğsü", &["tavuk göğsü"]),
/// ];
/// let ranked = score_candidates("Tavuk Göğsü Fileto", &dictionary);
/// assert_eq!(ranked[0].material_type, "Tavuk Göğsü");
/// assert_eq!(ranked[1].material_type, "Tavuk");
/// ```
pub fn score_candidates(name: &str, dictionary: &[KeywordEntry]) -> Vec<Candidate> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate> = dictionary
        .iter()
        .filter_map(|entry| {
            let best = entry
                .keywords
                .iter()
                .map(|k| normalize_name(k))
                .filter(|k| !k.is_empty() && name.contains(k.as_str()))
                .map(|k| char_len(&k))
                .max()?;
            Some(Candidate {
                material_type: entry.material_type.clone(),
                score: best,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| char_len(&b.material_type).cmp(&char_len(&a.material_type)))
    });

    trace!("Keyword candidates for '{}': {:?}", name, candidates);
    candidates
}

/// Whether a normalized rule label occurs in a normalized ingredient name
///
/// Short labels ("un", "yağ") need word boundaries so they do not match
/// inside unrelated words; longer labels are plain substrings.
pub fn label_matches(label: &str, name: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    if char_len(label) <= SHORT_LABEL_MAX_CHARS {
        short_label_pattern(label).is_some_and(|re| re.is_match(name))
    } else {
        name.contains(label)
    }
}

fn short_label_pattern(label: &str) -> Option<Regex> {
    let mut patterns = match SHORT_LABEL_PATTERNS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(re) = patterns.get(label) {
        return Some(re.clone());
    }
    let pattern = format!(r"(?i)\b{}\b", regex::escape(label));
    match Regex::new(&pattern) {
        Ok(re) => {
            patterns.insert(label.to_string(), re.clone());
            Some(re)
        }
        Err(e) => {
            warn!("Could not build word-boundary pattern for '{}': {}", label, e);
            None
        }
    }
}

/// Match an ingredient name directly against rule labels
///
/// An exact (case-insensitive) label wins outright; otherwise the longest
/// label contained in the name wins, earliest rule first on equal length.
pub fn direct_match<'r>(name: &str, rules: &[&'r SpecificationRule]) -> Option<&'r SpecificationRule> {
    let name = normalize_name(name);
    if name.is_empty() || rules.is_empty() {
        return None;
    }

    if let Some(exact) = rules
        .iter()
        .find(|r| !r.material_type.trim().is_empty() && normalize_name(&r.material_type) == name)
    {
        return Some(*exact);
    }

    let mut best: Option<(&'r SpecificationRule, usize)> = None;
    for rule in rules {
        let label = normalize_name(&rule.material_type);
        let len = char_len(&label);
        if label_matches(&label, &name) && best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((*rule, len));
        }
    }
    best.map(|(rule, _)| rule)
}

/// Keyword-driven rule matcher
#[derive(Debug, Clone, Default)]
pub struct IngredientMatcher {
    dictionary: Vec<KeywordEntry>,
}

impl IngredientMatcher {
    pub fn new(dictionary: Vec<KeywordEntry>) -> Self {
        debug!("Creating IngredientMatcher with {} dictionary entries", dictionary.len());
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &[KeywordEntry] {
        &self.dictionary
    }

    /// Ranked keyword candidates for a name
    pub fn candidates(&self, name: &str) -> Vec<Candidate> {
        score_candidates(name, &self.dictionary)
    }

    /// Find the rule governing an ingredient
    ///
    /// `subtype_rules` are the specification's rules scoped to the recipe's
    /// subtype; `all_rules` are every rule of the specification. Returns `None`
    /// when nothing matches at any step.
    pub fn find_rule<'r>(
        &self,
        name: &str,
        subtype_rules: &[&'r SpecificationRule],
        all_rules: &[&'r SpecificationRule],
    ) -> Option<RuleMatch<'r>> {
        let candidates = self.candidates(name);

        let passes = [
            (subtype_rules, MatchScope::Subtype, MatchScope::SubtypeDirect),
            (all_rules, MatchScope::Fallback, MatchScope::FallbackDirect),
        ];

        for (rules, keyword_scope, direct_scope) in passes {
            if rules.is_empty() {
                continue;
            }

            let bound = candidates.iter().find_map(|c| {
                rules
                    .iter()
                    .find(|r| r.material_type == c.material_type)
                    .copied()
            });
            if let Some(rule) = bound {
                debug!("'{}' bound to rule {} ({:?})", name, rule.id, keyword_scope);
                return Some(RuleMatch {
                    rule,
                    scope: keyword_scope,
                });
            }

            if let Some(rule) = direct_match(name, rules) {
                debug!("'{}' matched rule {} directly ({:?})", name, rule.id, direct_scope);
                return Some(RuleMatch {
                    rule,
                    scope: direct_scope,
                });
            }
        }

        debug!("No specification rule for '{}'", name);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, material_type: &str) -> SpecificationRule {
        SpecificationRule::new(id, 1, material_type, 100.0)
    }

    #[test]
    fn test_short_label_pattern_is_compiled_once() {
        assert!(label_matches("şş", "şş tavuk"));
        assert!(!label_matches("şş", "şşş"));
        let first = short_label_pattern("şş").unwrap();
        let second = short_label_pattern("şş").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        let patterns = SHORT_LABEL_PATTERNS.lock().unwrap();
        assert_eq!(patterns.keys().filter(|k| k.as_str() == "şş").count(), 1);
    }

    #[test]
    fn test_longer_keyword_wins() {
        let dictionary = vec![
            KeywordEntry::new("Tavuk", &["tavuk"]),
            KeywordEntry::new("Tavuk Göğsü", &["tavuk göğsü"]),
        ];
        let ranked = score_candidates("tavuk göğsü fileto", &dictionary);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].material_type, "Tavuk Göğsü");
        assert_eq!(ranked[0].score, 11);
        assert_eq!(ranked[1].score, 5);
    }

    #[test]
    fn test_label_length_breaks_score_ties() {
        let dictionary = vec![
            KeywordEntry::new("Et", &["kıyma"]),
            KeywordEntry::new("Kırmızı Et", &["kıyma"]),
        ];
        let ranked = score_candidates("dana kıyma", &dictionary);
        assert_eq!(ranked[0].material_type, "Kırmızı Et");
        assert_eq!(ranked[1].material_type, "Et");
    }

    #[test]
    fn test_full_ties_keep_dictionary_order() {
        let dictionary = vec![
            KeywordEntry::new("Pilav", &["pirinç"]),
            KeywordEntry::new("Bulgr", &["pirinç"]),
        ];
        let ranked = score_candidates("baldo pirinç", &dictionary);
        assert_eq!(ranked[0].material_type, "Pilav");
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let dictionary = vec![KeywordEntry::new("Her Şey", &["", "  "])];
        assert!(score_candidates("domates", &dictionary).is_empty());
        assert!(score_candidates("   ", &dictionary).is_empty());
    }

    #[test]
    fn test_short_labels_need_word_boundaries() {
        assert!(label_matches("un", "buğday un"));
        assert!(!label_matches("un", "tuna balığı"));
        assert!(!label_matches("yağ", "yağsız süt"));
        assert!(label_matches("yağ", "zeytin yağ"));
        // longer labels are plain substrings
        assert!(label_matches("domates", "domatesli sos"));
        assert!(!label_matches("", "domates"));
    }

    #[test]
    fn test_direct_match_prefers_exact_then_longest() {
        let a = rule(1, "Peynir");
        let b = rule(2, "Beyaz Peynir");
        let c = rule(3, "Beyaz Peynir Tam Yağlı");
        let rules = vec![&a, &b, &c];

        assert_eq!(direct_match("beyaz peynir", &rules).map(|r| r.id), Some(2));
        assert_eq!(
            direct_match("ezine beyaz peynir tam yağlı", &rules).map(|r| r.id),
            Some(3)
        );
        assert_eq!(direct_match("kaşar", &rules), None);
    }

    #[test]
    fn test_direct_match_equal_length_keeps_first() {
        let a = rule(1, "Kuzu");
        let b = rule(2, "Dana");
        let rules = vec![&a, &b];
        assert_eq!(direct_match("kuzu dana karışık", &rules).map(|r| r.id), Some(1));
    }

    #[test]
    fn test_find_rule_prefers_subtype_scope() {
        let dictionary = vec![
            KeywordEntry::new("Tavuk", &["tavuk"]),
            KeywordEntry::new("Tavuk Göğsü", &["tavuk göğsü"]),
        ];
        let matcher = IngredientMatcher::new(dictionary);

        let scoped_generic = rule(1, "Tavuk");
        let scoped_breast = rule(2, "Tavuk Göğsü");
        let global_breast = rule(3, "Tavuk Göğsü");
        let subtype = vec![&scoped_generic, &scoped_breast];
        let all = vec![&scoped_generic, &scoped_breast, &global_breast];

        let found = matcher.find_rule("tavuk göğsü fileto", &subtype, &all).unwrap();
        assert_eq!(found.rule.id, 2);
        assert_eq!(found.scope, MatchScope::Subtype);
    }

    #[test]
    fn test_find_rule_subtype_direct_before_global_keyword() {
        let matcher = IngredientMatcher::new(vec![KeywordEntry::new("Sebze", &["havuç"])]);
        let scoped = rule(1, "Havuç");
        let global = rule(2, "Sebze");
        let subtype = vec![&scoped];
        let all = vec![&scoped, &global];

        let found = matcher.find_rule("havuç", &subtype, &all).unwrap();
        assert_eq!(found.rule.id, 1);
        assert_eq!(found.scope, MatchScope::SubtypeDirect);
    }

    #[test]
    fn test_find_rule_falls_back_to_all_rules() {
        let matcher = IngredientMatcher::new(vec![KeywordEntry::new("Sebze", &["havuç"])]);
        let global = rule(2, "Sebze");
        let all = vec![&global];

        let found = matcher.find_rule("havuç", &[], &all).unwrap();
        assert_eq!(found.rule.id, 2);
        assert_eq!(found.scope, MatchScope::Fallback);

        let direct = rule(4, "Maydanoz");
        let all = vec![&direct];
        let found = matcher.find_rule("taze maydanoz", &[], &all).unwrap();
        assert_eq!(found.scope, MatchScope::FallbackDirect);
    }

    #[test]
    fn test_find_rule_none() {
        let matcher = IngredientMatcher::default();
        let global = rule(2, "Sebze");
        let all = vec![&global];
        assert!(matcher.find_rule("tuz", &[], &all).is_none());
        assert!(matcher.find_rule("", &[], &all).is_none());
    }
}
