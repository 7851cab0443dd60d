#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use recipe_reconciler::price_resolver::{price_rules, PriceResolver, PriceSource};
    use recipe_reconciler::reconcile_config::ReconcileConfig;
    use recipe_reconciler::reconcile_errors::ReconcileError;
    use recipe_reconciler::reconcile_model::ProductCard;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
    }

    fn create_resolver() -> PriceResolver {
        PriceResolver::new(today())
    }

    #[test]
    fn test_rule_order_is_documented_precedence() {
        let order: Vec<PriceSource> = price_rules().iter().map(|r| r.source).collect();
        assert_eq!(
            order,
            vec![
                PriceSource::Active,
                PriceSource::LastPurchase,
                PriceSource::Market,
                PriceSource::StaleLastPurchase,
                PriceSource::Manual,
                PriceSource::Variant,
            ]
        );
    }

    #[test]
    fn test_active_beats_fresh_purchase() {
        let card = ProductCard::new(1)
            .with_active_price(10.0)
            .with_last_purchase(5.0, today() - Duration::days(3));
        let price = create_resolver().resolve(&card).unwrap();
        assert_eq!(price.price, 10.0);
        assert_eq!(price.source, PriceSource::Active);
    }

    #[test]
    fn test_purchase_age_decides_freshness() {
        let fresh = ProductCard::new(1)
            .with_active_price(0.0)
            .with_last_purchase(5.0, today() - Duration::days(45));
        let price = create_resolver().resolve(&fresh).unwrap();
        assert_eq!(price.source, PriceSource::LastPurchase);
        assert_eq!(price.age_days, Some(45));

        let stale = ProductCard::new(1).with_last_purchase(5.0, today() - Duration::days(120));
        let price = create_resolver().resolve(&stale).unwrap();
        assert_eq!(price.price, 5.0);
        assert_eq!(price.source, PriceSource::StaleLastPurchase);
        assert!(price.is_stale());
    }

    #[test]
    fn test_market_price_sits_between_fresh_and_stale() {
        let card = ProductCard::new(2)
            .with_standard_unit("kg")
            .with_last_purchase(30.0, today() - Duration::days(200))
            .with_market_price(12.0, Some("Adet"));
        let price = create_resolver().resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::Market);
        assert_eq!(price.unit, "adet");
    }

    #[test]
    fn test_manual_then_variant_then_none() {
        let manual = ProductCard::new(3).with_manual_price(7.0).with_variant_price(9.0);
        assert_eq!(
            create_resolver().resolve(&manual).unwrap().source,
            PriceSource::Manual
        );

        let variant = ProductCard::new(3).with_variant_price(9.0);
        assert_eq!(
            create_resolver().resolve(&variant).unwrap().source,
            PriceSource::Variant
        );

        let nothing = ProductCard::new(3).with_price_unit("LT");
        let price = create_resolver().resolve(&nothing).unwrap();
        assert_eq!(price.source, PriceSource::None);
        assert!(price.is_zero());
        assert_eq!(price.unit, "lt");
    }

    #[test]
    fn test_configured_window() {
        let config = ReconcileConfig {
            freshness_days: 30,
            ..ReconcileConfig::default()
        };
        let resolver = PriceResolver::from_config(&config, today());
        let card = ProductCard::new(4).with_last_purchase(8.0, today() - Duration::days(45));
        assert_eq!(
            resolver.resolve(&card).unwrap().source,
            PriceSource::StaleLastPurchase
        );
    }

    #[test]
    fn test_future_purchase_date_is_not_fresh() {
        let card = ProductCard::new(5).with_last_purchase(8.0, today() + Duration::days(2));
        let price = create_resolver().resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::StaleLastPurchase);
        assert_eq!(price.age_days, Some(-2));
    }

    #[test]
    fn test_non_finite_price_is_a_fault() {
        let card = ProductCard::new(6).with_active_price(f64::INFINITY);
        let err = create_resolver().resolve(&card).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedProduct(_)));
    }
}
