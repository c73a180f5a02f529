//! Proptest strategies for Entangle types.

use std::sync::Arc;
use std::time::Duration;

use entangle_core::{Entity, Schema, WireMessage};
use entangle_sync::BackoffConfig;
use proptest::prelude::*;
use serde_json::Value;

/// Attribute names of the sample `Widget` type, besides `id`.
pub const WIDGET_ATTRIBUTES: [&str; 3] = ["color", "size", "state"];

/// A JSON scalar.
pub fn attribute_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

/// A primary-key value: an integer or a short string.
pub fn key_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..1_000).prop_map(Value::from),
        "[a-z0-9]{1,6}".prop_map(Value::from),
    ]
}

/// Backoff bounds with `max` a power-of-two multiple of `initial`.
pub fn backoff_config() -> impl Strategy<Value = BackoffConfig> {
    (1u64..2_000, 0u32..8).prop_map(|(initial, doublings)| BackoffConfig {
        initial: Duration::from_millis(initial),
        max: Duration::from_millis(initial << doublings),
    })
}

/// Parameters for a generated `Widget` message.
#[derive(Debug, Clone)]
pub struct WidgetParams {
    pub id: Value,
    /// Present attributes; absent ones are left out of the message.
    pub attributes: Vec<(String, Value)>,
}

impl Arbitrary for WidgetParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            key_value(),
            proptest::collection::vec(proptest::option::of(attribute_value()), 3),
        )
            .prop_map(|(id, values)| WidgetParams {
                id,
                attributes: WIDGET_ATTRIBUTES
                    .iter()
                    .zip(values)
                    .filter_map(|(name, value)| Some((name.to_string(), value?)))
                    .collect(),
            })
            .boxed()
    }
}

pub fn widget_schema() -> Arc<Schema> {
    let mut attributes = vec!["id"];
    attributes.extend(WIDGET_ATTRIBUTES);
    Arc::new(Schema::new("Widget", ["id"], attributes).expect("widget schema is valid"))
}

pub fn widget_from_params(params: &WidgetParams) -> WireMessage {
    params.attributes.iter().fold(
        WireMessage::new("Widget").with("id", params.id.clone()),
        |message, (name, value)| message.with(name.clone(), value.clone()),
    )
}

/// A fresh `Widget` entity.
pub fn widget_entity() -> Entity {
    Entity::new(widget_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entangle_core::StorageKey;
    use entangle_store::Registry;
    use entangle_sync::Backoff;

    use crate::fixtures::test_registry;

    proptest! {
        #[test]
        fn test_merge_is_idempotent(params: WidgetParams) {
            let message = widget_from_params(&params);
            let mut entity = widget_entity();

            entity.merge(&message);
            let attributes = entity.attributes().clone();
            let snapshot = entity.snapshot().map(|s| s.as_map().clone());

            entity.merge(&message);
            prop_assert_eq!(entity.attributes(), &attributes);
            prop_assert_eq!(entity.snapshot().map(|s| s.as_map().clone()), snapshot);
            prop_assert!(entity.sync_modified().is_empty());
        }

        #[test]
        fn test_replay_keeps_identity(first: WidgetParams, second: WidgetParams) {
            let registry: Registry = test_registry();
            let mut replay = widget_from_params(&second);
            replay.insert("id", first.id.clone());

            let a = registry.sync_receive(&widget_from_params(&first), None).unwrap();
            let b = registry.sync_receive(&replay, None).unwrap();
            prop_assert!(a.ptr_eq(&b));
            prop_assert_eq!(registry.class("Widget").unwrap().storage().unwrap().len(), 1);
        }

        #[test]
        fn test_backoff_stays_in_bounds(config in backoff_config(), steps in 1usize..40) {
            let mut backoff = Backoff::new(config.clone());
            let mut previous = Duration::ZERO;
            for step in 0..steps {
                let delay = backoff.next_delay();
                if step == 0 {
                    prop_assert_eq!(delay, config.initial);
                }
                prop_assert!(delay <= config.max);
                prop_assert!(delay >= previous);
                previous = delay;
            }
            backoff.reset();
            prop_assert_eq!(backoff.next_delay(), config.initial);
        }

        #[test]
        fn test_storage_keys_keep_types_apart(n in any::<i64>()) {
            let number = Value::from(n);
            let text = Value::from(n.to_string());
            prop_assert_ne!(
                StorageKey::from_values(&[&number]),
                StorageKey::from_values(&[&text])
            );
        }
    }
}
