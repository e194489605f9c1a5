use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Unified deterministic runtime configuration.
#[derive(Clone, Debug)]
pub struct DeterminismConfig {
    /// Whether deterministic execution is enabled globally.
    pub enabled: bool,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
    /// If true reductions should run sequentially to ensure stable ordering.
    pub fix_reduction: bool,
}

impl DeterminismConfig {
    /// Builds a configuration snapshot from environment variables.
    fn from_env() -> Self {
        let enabled = std::env::var("STRATA_DETERMINISTIC")
            .ok()
            .map(|v| !matches!(v.as_str(), "0" | "false" | "False" | "off" | "OFF"))
            .unwrap_or(false);

        let base_seed = std::env::var("STRATA_DETERMINISTIC_SEED")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(42);

        let fix_reduction = std::env::var("STRATA_DETERMINISTIC_REDUCTION")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "on" | "ON"))
            .unwrap_or(enabled);

        Self {
            enabled,
            base_seed,
            fix_reduction,
        }
    }

    /// Derives a deterministic seed for a given component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Returns the lazily initialised deterministic configuration.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| {
        let cfg = DeterminismConfig::from_env();
        apply_process_hints(&cfg);
        cfg
    })
}

/// Overrides the deterministic configuration. Intended for tests.
pub fn configure(cfg: DeterminismConfig) -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| {
        apply_process_hints(&cfg);
        cfg
    })
}

fn apply_process_hints(cfg: &DeterminismConfig) {
    if cfg.enabled && cfg.fix_reduction {
        // Hint Rayon before any pools are built. This is best-effort; if a pool
        // already exists the environment change is harmless but ineffectual.
        std::env::set_var("RAYON_NUM_THREADS", "1");
    }
    if cfg.enabled {
        std::env::set_var("STRATA_DETERMINISTIC_ACTIVE", "1");
    }
}

/// Returns a RNG derived from the provided label. When determinism is disabled
/// this falls back to a random seed from the operating system.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

/// Returns a RNG seeded from an optional explicit seed, respecting deterministic
/// overrides when the seed is not provided.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => rng_from_label(label),
    }
}

/// Returns whether reductions should be forced to run sequentially.
pub fn lock_reduction_order() -> bool {
    config().enabled && config().fix_reduction
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::{Mutex, OnceLock};

    fn with_env(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD.get_or_init(|| Mutex::new(())).lock().unwrap();

        let snapshot: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
                ((*key).to_string(), previous)
            })
            .collect();

        let result = catch_unwind(AssertUnwindSafe(test));

        for (key, value) in snapshot {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }

        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn determinism_stays_off_without_an_explicit_enable() {
        for toggle in [None, Some("0"), Some("False"), Some("OFF")] {
            with_env(
                &[
                    ("STRATA_DETERMINISTIC", toggle),
                    ("STRATA_DETERMINISTIC_SEED", None),
                    ("STRATA_DETERMINISTIC_REDUCTION", None),
                ],
                || {
                    let cfg = DeterminismConfig::from_env();
                    assert!(!cfg.enabled, "toggle {toggle:?}");
                    assert_eq!(cfg.base_seed, 42);
                    assert!(!cfg.fix_reduction);
                },
            );
        }
    }

    #[test]
    fn environment_toggles_flow_into_the_snapshot() {
        with_env(
            &[
                ("STRATA_DETERMINISTIC", Some("on")),
                ("STRATA_DETERMINISTIC_SEED", Some("7177")),
                ("STRATA_DETERMINISTIC_REDUCTION", Some("0")),
            ],
            || {
                let cfg = DeterminismConfig::from_env();
                assert!(cfg.enabled);
                assert_eq!(cfg.base_seed, 7177);
                // An explicit "0" overrides the enabled-implies-fixed default.
                assert!(!cfg.fix_reduction);
            },
        );
    }

    #[test]
    fn reduction_follows_the_master_switch_when_unset() {
        with_env(
            &[
                ("STRATA_DETERMINISTIC", Some("1")),
                ("STRATA_DETERMINISTIC_REDUCTION", None),
            ],
            || {
                assert!(DeterminismConfig::from_env().fix_reduction);
            },
        );
    }

    #[test]
    fn layer_labels_derive_stable_distinct_seeds() {
        with_env(
            &[
                ("STRATA_DETERMINISTIC", Some("1")),
                ("STRATA_DETERMINISTIC_SEED", Some("424242")),
            ],
            || {
                let cfg = DeterminismConfig::from_env();
                let w_ih = cfg.seed_for("strata-machine/lstm/w_ih");
                let w_hh = cfg.seed_for("strata-machine/lstm/w_hh");
                let head = cfg.seed_for("strata-nn/linear/lstm::head");
                assert_eq!(w_ih, cfg.seed_for("strata-machine/lstm/w_ih"));
                assert_ne!(w_ih, w_hh);
                assert_ne!(w_ih, head);
                assert_ne!(w_hh, head);
            },
        );
    }

    #[test]
    fn explicit_seeds_bypass_the_environment() {
        let mut first = rng_from_optional(Some(31), "strata-machine/rnn/recurrent");
        let mut second = rng_from_optional(Some(31), "strata-machine/rnn/recurrent");
        let mut other = rng_from_optional(Some(32), "strata-machine/rnn/recurrent");
        let a: Vec<u64> = (0..4).map(|_| first.next_u64()).collect();
        let b: Vec<u64> = (0..4).map(|_| second.next_u64()).collect();
        let c: Vec<u64> = (0..4).map(|_| other.next_u64()).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
