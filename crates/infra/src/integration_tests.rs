//! Cross-component scenarios.
//!
//! Tests: Config → Engine → Registrar → EventBus → Custom conversion
//!
//! Verifies:
//! - Environment settings reach every converter
//! - Registered custom units are published and immediately convertible
//! - Owner scopes stay isolated
//! - Engine errors map onto the workspace error type

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use unitforge_core::{DomainError, RecordId, TenantId};
    use unitforge_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use unitforge_uom::{
        CustomConversionInput, CustomUnitStore, InMemoryConversionLog, InMemoryCustomUnitStore,
        ItemPackaging, NewCustomUnit, Owner, OwnerKind, PackagingId, UomEngine, UomError, UomEvent,
        seed,
    };

    use crate::config::{self, UomConfig};

    fn engine_from(vars: &[(&str, &str)]) -> UomEngine {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = UomConfig::from_lookup(|key| vars.get(key).cloned());
        UomEngine::new(seed::baseline().unwrap(), config.engine_settings())
    }

    #[test]
    fn configured_engine_converts_across_modules() {
        let engine = engine_from(&[(config::DEFAULT_PRECISION, "3"), (config::MAX_PATH_HOPS, "3")]);

        assert_eq!(engine.convert(1, "pound", "kilogram", None).unwrap(), dec!(0.454));
        assert_eq!(engine.convert(1, "KM", "IN", None).unwrap(), dec!(39370.079));
        assert_eq!(engine.convert_compound(36, "km/h", "m/s", None).unwrap(), dec!(10));

        let packaging = engine.packaging();
        let case = packaging.resolve_packaging("each", "CS").unwrap();
        assert_eq!(packaging.packages_to_base(3, case, None).unwrap(), dec!(72));
        assert_eq!(packaging.base_to_packages(80, case, None).unwrap(), dec!(3));
    }

    #[test]
    fn registered_unit_is_published_and_convertible() {
        let engine = engine_from(&[]);
        let store = InMemoryCustomUnitStore::arc();
        let bus: Arc<InMemoryEventBus<EventEnvelope<UomEvent>>> = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();

        let tenant = TenantId::new();
        let owner = Owner::tenant(tenant);
        let unit = engine
            .registrar(store.clone())
            .register_and_publish(
                NewCustomUnit::new("PALLET", "Pallet", "mass", 400),
                Some(owner),
                vec![CustomConversionInput::new("LB", dec!(881.849))],
                &bus,
            )
            .unwrap();

        let envelope = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.event_type(), "uom.custom_unit.registered");
        assert_eq!(envelope.tenant_id(), Some(tenant));
        let UomEvent::CustomUnitRegistered(registered) = envelope.payload();
        assert_eq!(registered.unit_id, unit.id);
        assert_eq!(registered.conversion_count, 1);

        let custom = engine.custom(&store);
        assert_eq!(custom.convert(2, "pallet", "KG", Some(&owner), None).unwrap(), dec!(800));
        assert_eq!(custom.convert(1, "PALLET", "LB", Some(&owner), None).unwrap(), dec!(881.849));
        assert_eq!(store.conversions_from(unit.id).unwrap().len(), 1);
    }

    #[test]
    fn owner_scopes_do_not_leak() {
        let engine = engine_from(&[]);
        let store = InMemoryCustomUnitStore::arc();
        let a = Owner::tenant(TenantId::new());
        let b = Owner::tenant(TenantId::new());

        engine
            .registrar(store.clone())
            .register(NewCustomUnit::new("TOTE", "Tote", "volume", 30), Some(a), vec![])
            .unwrap();

        let custom = engine.custom(&store);
        assert_eq!(custom.convert(1, "TOTE", "L", Some(&a), None).unwrap(), dec!(30));
        assert!(matches!(
            custom.convert(1, "TOTE", "L", Some(&b), None),
            Err(UomError::UnitNotFound(_))
        ));
        assert!(store.list_for_owner(Some(&b)).unwrap().is_empty());
    }

    #[test]
    fn product_scoped_unit_alongside_item_packagings() {
        let product = RecordId::new();
        let mut builder = seed::baseline_builder();
        builder.add_item_packaging(ItemPackaging {
            item_id: product,
            packaging_id: PackagingId(2),
        });
        let engine = UomEngine::new(builder.build().unwrap(), Default::default());

        let packaging = engine.packaging();
        let case = packaging.item_packaging(product, "CS").unwrap();
        assert_eq!(packaging.base_to_packages(50, case, None).unwrap(), dec!(2));

        let store = InMemoryCustomUnitStore::arc();
        let owner = Owner::record(OwnerKind::Product, product);
        engine
            .registrar(store.clone())
            .register(
                NewCustomUnit::new("LAYER", "Layer of cases", "count", 96),
                Some(owner),
                vec![CustomConversionInput::new("CS", 4)],
            )
            .unwrap();

        let custom = engine.custom(&store);
        assert_eq!(custom.convert(2, "LAYER", "CS", Some(&owner), None).unwrap(), dec!(8));
        assert_eq!(custom.convert(1, "LAYER", "EA", Some(&owner), None).unwrap(), dec!(96));
        assert!(matches!(
            custom.convert(1, "LAYER", "EA", Some(&Owner::record(OwnerKind::Product, RecordId::new())), None),
            Err(UomError::UnitNotFound(_))
        ));
    }

    #[test]
    fn conversion_log_follows_configuration() {
        let sink = InMemoryConversionLog::arc();
        let engine = engine_from(&[(config::LOG_CONVERSIONS, "true")]).with_log_sink(sink.clone());

        let outcome = engine.convert_detailed(100, "C", "F", None).unwrap();
        assert_eq!(outcome.value, dec!(212));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, dec!(100));
        assert_eq!(entries[0].result, dec!(212));
        assert_eq!(entries[0].factor_used, dec!(1.8));
        assert_eq!(entries[0].metadata, Some(serde_json::json!({ "path": ["C", "F"] })));
    }

    #[test]
    fn engine_errors_map_to_domain_errors() {
        let engine = engine_from(&[]);

        let err: DomainError = engine.convert(1, "KG", "M", None).unwrap_err().into();
        assert!(matches!(err, DomainError::Validation(_)));

        let err: DomainError = engine.convert(1, "XYZ", "KG", None).unwrap_err().into();
        assert!(matches!(err, DomainError::NotFound(_)));

        let store = InMemoryCustomUnitStore::new();
        let registrar = engine.registrar(&store);
        registrar
            .register(NewCustomUnit::new("DRUM", "Drum", "volume", 200), None, vec![])
            .unwrap();
        let err: DomainError = registrar
            .register(NewCustomUnit::new("drum", "Drum", "volume", 208), None, vec![])
            .unwrap_err()
            .into();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
