//! Property-based tests for embedgraph-common foundational types.

use embedgraph_common::{BuilderConfig, DeviceKind, DeviceSpec};
use proptest::prelude::*;

fn any_kind() -> impl Strategy<Value = DeviceKind> {
    prop_oneof![Just(DeviceKind::Cpu), Just(DeviceKind::Cuda), Just(DeviceKind::Hip)]
}

// ── DeviceSpec ────────────────────────────────────────────────────────────────

proptest! {
    /// Display output parses back to the same placement.
    #[test]
    fn prop_device_spec_display_parses_back(kind in any_kind(), index in 0u32..64) {
        let spec = DeviceSpec::new(kind, index);
        let parsed: DeviceSpec = spec.to_string().parse().unwrap();
        prop_assert_eq!(parsed, spec);
    }

    /// Equality distinguishes ordinals on the same kind.
    #[test]
    fn prop_device_spec_index_matters(kind in any_kind(), a in 0u32..64, b in 0u32..64) {
        prop_assert_eq!(DeviceSpec::new(kind, a) == DeviceSpec::new(kind, b), a == b);
    }
}

// ── BuilderConfig ─────────────────────────────────────────────────────────────

proptest! {
    /// Any config that validates survives a TOML round trip.
    #[test]
    fn prop_builder_config_toml_stable(
        net_name in "[a-z][a-z0-9_]{0,15}",
        layer in "[a-z][a-z0-9_]{0,15}",
        request_only in any::<bool>(),
    ) {
        let config = BuilderConfig::builder()
            .net_name(net_name)
            .default_layer_name(layer)
            .request_only(request_only)
            .build()
            .unwrap();
        let text = toml::to_string(&config).unwrap();
        let back: BuilderConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(back, config);
    }
}
