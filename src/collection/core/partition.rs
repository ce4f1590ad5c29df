//! Static stable/unstable split of the collected attributes.

use serde::{Deserialize, Serialize};

use super::context::FingerprintMap;
use super::keys;

/// Attributes known to drift between visits regardless of measured noise.
pub const UNSTABLE_KEYS: &[&str] = &[
    keys::BATTERY,
    keys::AD_BLOCKER,
    keys::THEME_CHANGER,
    keys::CPU_TIMING,
    keys::EFFECTIVE_NETWORK_TYPE,
    keys::DOWNLINK,
    keys::RTT,
    keys::GEOLOCATION,
];

pub fn is_unstable_key(key: &str) -> bool {
    UNSTABLE_KEYS.contains(&key)
}

/// Two disjoint halves of a fingerprint map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitioned {
    pub stable: FingerprintMap,
    pub unstable: FingerprintMap,
}

/// Split `map` by key identity against [`UNSTABLE_KEYS`].
pub fn partition(map: &FingerprintMap) -> Partitioned {
    let (unstable, stable) = map
        .iter()
        .map(|(key, reading)| (key.clone(), reading.clone()))
        .partition(|(key, _)| is_unstable_key(key));

    Partitioned { stable, unstable }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::core::types::{ProbeFault, Reading};
    use std::collections::BTreeSet;

    fn sample_map() -> FingerprintMap {
        let mut map = FingerprintMap::new();
        map.insert(keys::USER_AGENT.into(), Reading::value("Mozilla/5.0"));
        map.insert(keys::COLOR_DEPTH.into(), Reading::value(24_i64));
        map.insert(keys::BATTERY.into(), Reading::value("available (charging: true)"));
        map.insert(keys::GEOLOCATION.into(), Reading::fault(ProbeFault::PermissionDenied));
        map.insert(keys::RTT.into(), Reading::value(50_i64));
        map.insert("custom_signal".into(), Reading::value(true));
        map
    }

    #[test]
    fn halves_are_disjoint_and_complete() {
        let input = sample_map();
        let Partitioned { stable, unstable } = partition(&input);

        let stable_keys: BTreeSet<_> = stable.keys().collect();
        let unstable_keys: BTreeSet<_> = unstable.keys().collect();
        assert!(stable_keys.is_disjoint(&unstable_keys));

        let mut union = stable.clone();
        union.extend(unstable.clone());
        assert_eq!(union, input);
    }

    #[test]
    fn unstable_keys_are_exactly_the_intersection() {
        let input = sample_map();
        let unstable = partition(&input).unstable;

        let expected: BTreeSet<&str> = input
            .keys()
            .map(String::as_str)
            .filter(|key| UNSTABLE_KEYS.contains(key))
            .collect();
        let actual: BTreeSet<&str> = unstable.keys().map(String::as_str).collect();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 3);
    }

    #[test]
    fn empty_map_partitions_into_empty_halves() {
        assert_eq!(partition(&FingerprintMap::new()), Partitioned::default());
    }
}
