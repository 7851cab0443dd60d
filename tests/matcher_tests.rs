#[cfg(test)]
mod tests {
    use recipe_reconciler::ingredient_matcher::{label_matches, IngredientMatcher, MatchScope};
    use recipe_reconciler::reconcile_model::{KeywordEntry, SpecificationRule};

    fn create_matcher() -> IngredientMatcher {
        IngredientMatcher::new(vec![
            KeywordEntry::new("Tavuk", &["tavuk", "piliç"]),
            KeywordEntry::new("Tavuk Göğsü", &["tavuk göğsü"]),
            KeywordEntry::new("Kırmızı Et", &["dana", "kuzu", "kıyma"]),
            KeywordEntry::new("Sıvı Yağ", &["ayçiçek yağı", "zeytinyağı"]),
        ])
    }

    fn rules() -> Vec<SpecificationRule> {
        vec![
            SpecificationRule::new(1, 1, "Tavuk", 120.0).with_subtype(10),
            SpecificationRule::new(2, 1, "Tavuk Göğsü", 150.0).with_subtype(10),
            SpecificationRule::new(3, 1, "Kırmızı Et", 100.0).with_subtype(20),
            SpecificationRule::new(4, 1, "Sıvı Yağ", 15.0),
            SpecificationRule::new(5, 1, "Un", 20.0),
            SpecificationRule::new(6, 1, "Salça", 10.0),
        ]
    }

    fn scoped(rules: &[SpecificationRule], subtype: i64) -> Vec<&SpecificationRule> {
        rules.iter().filter(|r| r.subtype_id == Some(subtype)).collect()
    }

    #[test]
    fn test_longest_keyword_selects_material_type() {
        let rules = rules();
        let all: Vec<&SpecificationRule> = rules.iter().collect();
        let found = create_matcher()
            .find_rule("Tavuk Göğsü Fileto", &scoped(&rules, 10), &all)
            .unwrap();
        assert_eq!(found.rule.id, 2);
        assert_eq!(found.scope, MatchScope::Subtype);
    }

    #[test]
    fn test_falls_back_to_all_rules() {
        let rules = rules();
        let all: Vec<&SpecificationRule> = rules.iter().collect();
        // Subtype 10 has no red-meat rule, so the full list is searched
        let found = create_matcher()
            .find_rule("dana kuşbaşı", &scoped(&rules, 10), &all)
            .unwrap();
        assert_eq!(found.rule.id, 3);
        assert_eq!(found.scope, MatchScope::Fallback);
    }

    #[test]
    fn test_direct_label_match() {
        let rules = rules();
        let all: Vec<&SpecificationRule> = rules.iter().collect();
        let found = create_matcher()
            .find_rule("domates salça", &scoped(&rules, 10), &all)
            .unwrap();
        assert_eq!(found.rule.id, 6);
        assert_eq!(found.scope, MatchScope::FallbackDirect);
    }

    #[test]
    fn test_short_labels_need_word_boundaries() {
        assert!(label_matches("un", "buğday un"));
        assert!(label_matches("Un", "UN"));
        assert!(!label_matches("un", "tuna balığı"));
        assert!(!label_matches("un", "sucuk"));
        assert!(label_matches("salça", "biber salçası"));

        let rules = rules();
        let all: Vec<&SpecificationRule> = rules.iter().collect();
        assert!(create_matcher().find_rule("tuna balığı", &[], &all).is_none());
    }

    #[test]
    fn test_no_rules_no_match() {
        assert!(create_matcher().find_rule("tavuk", &[], &[]).is_none());
        assert!(create_matcher().find_rule("", &[], &[]).is_none());
    }

    #[test]
    fn test_matching_is_deterministic() {
        let rules = rules();
        let all: Vec<&SpecificationRule> = rules.iter().collect();
        let matcher = create_matcher();
        let first = matcher.find_rule("ayçiçek yağı", &[], &all).map(|m| m.rule.id);
        for _ in 0..5 {
            assert_eq!(matcher.find_rule("ayçiçek yağı", &[], &all).map(|m| m.rule.id), first);
        }
        assert_eq!(first, Some(4));
    }
}
