//! Bait selection and the off-screen container the baits live in.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::collection::core::ProbeFault;
use crate::config::BaitSelection;
use crate::environment::{BrowserEnvironment, ElementSpec, NodeId, ScopedElement};

use super::rules::BaitBlueprint;

/// Pick as many selectors as there are usable rules.
pub fn choose_selectors<'a>(selectors: &'a [String], selection: BaitSelection) -> Vec<&'a str> {
    if selectors.is_empty() {
        return Vec::new();
    }
    match selection {
        BaitSelection::Exhaustive => selectors.iter().map(String::as_str).collect(),
        BaitSelection::Random => draw(selectors, &mut rand::thread_rng()),
        BaitSelection::Seeded { seed } => draw(selectors, &mut StdRng::seed_from_u64(seed)),
    }
}

// Uniform draws with replacement.
fn draw<'a>(selectors: &'a [String], rng: &mut impl Rng) -> Vec<&'a str> {
    (0..selectors.len())
        .map(|_| selectors[rng.gen_range(0..selectors.len())].as_str())
        .collect()
}

/// Off-screen container plus the baits attached under it. Dropping it
/// detaches the whole subtree.
pub struct BaitHouse<'a> {
    env: &'a dyn BrowserEnvironment,
    container: ScopedElement<'a>,
    baits: Vec<(String, NodeId)>,
    skipped: usize,
}

impl<'a> BaitHouse<'a> {
    pub fn build(
        env: &'a dyn BrowserEnvironment,
        selectors: &[&str],
    ) -> Result<Self, ProbeFault> {
        let container = ScopedElement::create(env, &ElementSpec::div().off_screen(), None)?;
        let mut baits = Vec::with_capacity(selectors.len());
        let mut skipped = 0;

        for selector in selectors {
            let blueprint = match BaitBlueprint::from_selector(selector) {
                Ok(blueprint) => blueprint,
                Err(err) => {
                    log::trace!("skipping bait for `{selector}`: {err}");
                    skipped += 1;
                    continue;
                }
            };
            match env.create_element(&blueprint.to_element(), Some(container.node())) {
                Ok(node) => baits.push((selector.to_string(), node)),
                Err(fault) => {
                    log::trace!("skipping bait for `{selector}`: {fault}");
                    skipped += 1;
                }
            }
        }

        Ok(Self {
            env,
            container,
            baits,
            skipped,
        })
    }

    pub fn len(&self) -> usize {
        self.baits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baits.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn container(&self) -> NodeId {
        self.container.node()
    }

    /// Number of baits that were hidden, collapsed or removed.
    pub fn count_blocked(&self) -> usize {
        self.baits
            .iter()
            .filter(|(selector, node)| match self.env.measure(*node) {
                Ok(rect) => rect.is_hidden(),
                Err(fault) => {
                    log::trace!("bait for `{selector}` could not be measured: {fault}");
                    true
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ContentBlocker, SimulatedEnvironment};

    fn owned(selectors: &[&str]) -> Vec<String> {
        selectors.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selection_draws_one_per_rule() {
        let rules = owned(&[".a", ".b", ".c"]);
        assert_eq!(choose_selectors(&rules, BaitSelection::Exhaustive), vec![".a", ".b", ".c"]);
        assert_eq!(choose_selectors(&rules, BaitSelection::Random).len(), 3);
        assert!(choose_selectors(&[], BaitSelection::Random).is_empty());
    }

    #[test]
    fn seeded_selection_is_reproducible() {
        let rules = owned(&[".a", ".b", ".c", ".d", ".e"]);
        let first = choose_selectors(&rules, BaitSelection::Seeded { seed: 42 });
        let second = choose_selectors(&rules, BaitSelection::Seeded { seed: 42 });
        assert_eq!(first, second);
        assert!(first.iter().all(|s| rules.iter().any(|r| r.as_str() == *s)));
    }

    #[test]
    fn house_skips_malformed_and_counts_blocked() {
        let env = SimulatedEnvironment::desktop_chrome()
            .with_content_blocker(ContentBlocker::new([".ad-banner"]));
        let house = BaitHouse::build(&env, &[".ad-banner", "[bad^=x]", ".harmless"]).unwrap();

        assert_eq!(house.len(), 2);
        assert_eq!(house.skipped(), 1);
        assert_eq!(house.count_blocked(), 1);
        assert_eq!(env.attached_elements(), 3);

        drop(house);
        assert_eq!(env.attached_elements(), 0);
    }

    // Hosts elements normally but cannot lay any of them out.
    struct Unmeasurable(SimulatedEnvironment);

    impl BrowserEnvironment for Unmeasurable {
        fn navigator(&self) -> crate::environment::NavigatorInfo {
            self.0.navigator()
        }

        fn create_element(
            &self,
            spec: &ElementSpec,
            parent: Option<NodeId>,
        ) -> Result<NodeId, ProbeFault> {
            self.0.create_element(spec, parent)
        }

        fn measure(&self, node: NodeId) -> Result<crate::environment::ElementBox, ProbeFault> {
            Err(ProbeFault::failed(format!("layout unavailable for {node}")))
        }

        fn remove_element(&self, node: NodeId) -> Result<(), ProbeFault> {
            self.0.remove_element(node)
        }

        fn is_attached(&self, node: NodeId) -> bool {
            self.0.is_attached(node)
        }
    }

    #[test]
    fn unmeasurable_baits_count_as_blocked() {
        let visible = SimulatedEnvironment::desktop_chrome();
        let house = BaitHouse::build(&visible, &[".harmless", ".also-harmless"]).unwrap();
        assert_eq!(house.count_blocked(), 0);
        drop(house);

        let env = Unmeasurable(SimulatedEnvironment::desktop_chrome());
        let house = BaitHouse::build(&env, &[".harmless", ".also-harmless"]).unwrap();
        assert_eq!(house.len(), 2);
        assert_eq!(house.count_blocked(), 2);

        drop(house);
        assert_eq!(env.0.attached_elements(), 0);
    }
}
