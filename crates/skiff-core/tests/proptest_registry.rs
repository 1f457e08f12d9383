//! Property tests for collision type registration.
//!
//! Random sequences of class names (with repeats) are registered and the
//! registry is checked for unique, order-stable identifiers.

use std::collections::HashSet;

use proptest::prelude::*;
use skiff_core::prelude::*;

fn class_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-e][a-z]{0,3}", 1..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn bitmask_ids_are_unique_single_bits(names in class_names()) {
        let mut reg = CollisionTypeRegistry::new(IdEncoding::Bitmask);
        let mut seen = HashSet::new();
        for name in &names {
            match reg.register(name) {
                Ok(id) => {
                    prop_assert_eq!(id.bits().count_ones(), 1);
                    prop_assert_eq!(reg.lookup(name), Some(id));
                    seen.insert(id);
                }
                Err(CoreError::IdentifierSpaceExhausted { limit, .. }) => {
                    prop_assert_eq!(reg.len(), limit);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
        // One identifier per distinct name that made it in.
        prop_assert_eq!(seen.len(), reg.len());
    }

    #[test]
    fn sequential_ids_track_first_registration(names in class_names()) {
        let mut reg = CollisionTypeRegistry::new(IdEncoding::Sequential);
        let mut order: Vec<&str> = Vec::new();
        for name in &names {
            let id = reg.register(name).unwrap();
            if !order.contains(&name.as_str()) {
                order.push(name);
            }
            let position = order.iter().position(|n| *n == name).unwrap();
            prop_assert_eq!(id.bits() as usize, position + 1);
        }
        let listed: Vec<&str> = reg.iter().map(|(name, _)| name).collect();
        prop_assert_eq!(listed, order);
    }

    #[test]
    fn filters_interact_only_when_both_sides_list_each_other(
        links in prop::collection::vec((0usize..6, 0usize..6), 0..20)
    ) {
        let names = ["a", "b", "c", "d", "e", "f"];
        let mut catalog = ClassCatalog::new();
        for (i, name) in names.iter().enumerate() {
            let others: Vec<&str> = links
                .iter()
                .filter(|(src, _)| *src == i)
                .map(|(_, dst)| names[*dst])
                .collect();
            catalog.declare(ClassDescriptor::new(*name).collides_with(&others)).unwrap();
        }
        catalog.validate().unwrap();

        for (i, a) in names.iter().enumerate() {
            for (j, b) in names.iter().enumerate() {
                let fa = catalog.filter_for(a).unwrap();
                let fb = catalog.filter_for(b).unwrap();
                let mutual = links.contains(&(i, j)) && links.contains(&(j, i));
                prop_assert_eq!(fa.interacts(&fb), mutual, "{} vs {}", a, b);
            }
        }
    }
}
