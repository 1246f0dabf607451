// Static capability table for Apple Silicon variants, keyed by CPU brand string.

use serde::Serialize;

/// Fixed capability limits of one hardware variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChipSpec {
    pub name: &'static str,
    pub max_cpu_power_w: f64,
    pub max_gpu_power_w: f64,
    pub max_ane_power_w: f64,
    pub max_bandwidth_gbs: f64,
    pub e_clusters: u32,
    pub p_clusters: u32,
    /// False for the fallback spec; limits are then zero and percentage-of-max values
    /// should be suppressed.
    pub known: bool,
}

impl ChipSpec {
    /// Fallback for identifiers no rule recognises.
    pub const UNKNOWN: ChipSpec = ChipSpec {
        name: "Unknown",
        max_cpu_power_w: 0.0,
        max_gpu_power_w: 0.0,
        max_ane_power_w: 0.0,
        max_bandwidth_gbs: 0.0,
        e_clusters: 1,
        p_clusters: 1,
        known: false,
    };
}

const fn spec(
    name: &'static str,
    max_cpu_power_w: f64,
    max_gpu_power_w: f64,
    max_ane_power_w: f64,
    max_bandwidth_gbs: f64,
    e_clusters: u32,
    p_clusters: u32,
) -> ChipSpec {
    ChipSpec {
        name,
        max_cpu_power_w,
        max_gpu_power_w,
        max_ane_power_w,
        max_bandwidth_gbs,
        e_clusters,
        p_clusters,
        known: true,
    }
}

/// One matching rule: `pattern` is compared case-insensitively against the identifier.
#[derive(Debug, Clone)]
pub struct ChipRule {
    pub pattern: &'static str,
    pub spec: ChipSpec,
}

const fn rule(pattern: &'static str, spec: ChipSpec) -> ChipRule {
    ChipRule { pattern, spec }
}

// Most specific first: within a generation Ultra/Max/Pro precede the base model,
// otherwise "Apple M2" would claim "Apple M2 Max".
const RULES: &[ChipRule] = &[
    rule("Apple M4 Max", spec("Apple M4 Max", 45.0, 80.0, 8.0, 546.0, 1, 2)),
    rule("Apple M4 Pro", spec("Apple M4 Pro", 40.0, 40.0, 8.0, 273.0, 1, 2)),
    rule("Apple M4", spec("Apple M4", 25.0, 20.0, 8.0, 120.0, 1, 1)),
    rule("Apple M3 Ultra", spec("Apple M3 Ultra", 80.0, 140.0, 16.0, 819.0, 2, 4)),
    rule("Apple M3 Max", spec("Apple M3 Max", 40.0, 70.0, 8.0, 400.0, 1, 2)),
    rule("Apple M3 Pro", spec("Apple M3 Pro", 35.0, 35.0, 8.0, 150.0, 1, 1)),
    rule("Apple M3", spec("Apple M3", 25.0, 20.0, 8.0, 100.0, 1, 1)),
    rule("Apple M2 Ultra", spec("Apple M2 Ultra", 70.0, 130.0, 16.0, 800.0, 2, 4)),
    rule("Apple M2 Max", spec("Apple M2 Max", 35.0, 65.0, 8.0, 400.0, 1, 2)),
    rule("Apple M2 Pro", spec("Apple M2 Pro", 35.0, 35.0, 8.0, 200.0, 1, 2)),
    rule("Apple M2", spec("Apple M2", 25.0, 15.0, 8.0, 100.0, 1, 1)),
    rule("Apple M1 Ultra", spec("Apple M1 Ultra", 60.0, 120.0, 16.0, 800.0, 2, 4)),
    rule("Apple M1 Max", spec("Apple M1 Max", 30.0, 60.0, 8.0, 400.0, 1, 2)),
    rule("Apple M1 Pro", spec("Apple M1 Pro", 30.0, 30.0, 8.0, 200.0, 1, 2)),
    rule("Apple M1", spec("Apple M1", 20.0, 20.0, 8.0, 70.0, 1, 1)),
];

/// Read-only registry of chip rules, evaluated exact match first, then substring in rule order.
#[derive(Debug, Clone)]
pub struct ChipSpecRegistry {
    rules: &'static [ChipRule],
}

impl Default for ChipSpecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipSpecRegistry {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    pub fn rules(&self) -> &[ChipRule] {
        self.rules
    }

    /// Resolves a brand string such as "Apple M1 Max". Never fails: unrecognised
    /// identifiers yield [`ChipSpec::UNKNOWN`].
    pub fn lookup(&self, identifier: &str) -> ChipSpec {
        let needle = identifier.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return ChipSpec::UNKNOWN;
        }
        if let Some(r) = self
            .rules
            .iter()
            .find(|r| r.pattern.eq_ignore_ascii_case(&needle))
        {
            return r.spec.clone();
        }
        // Substring fallback tolerates decorated identifiers ("Apple M2 Pro (Virtual)")
        // and bare model names ("M1 Ultra").
        self.rules
            .iter()
            .find(|r| {
                let pattern = r.pattern.to_ascii_lowercase();
                contains_word(&needle, &pattern)
                    || pattern
                        .strip_prefix("apple ")
                        .is_some_and(|model| contains_word(&needle, model))
            })
            .map(|r| r.spec.clone())
            .unwrap_or(ChipSpec::UNKNOWN)
    }
}

/// True when `word` occurs in `haystack` with no letter or digit directly on either side
/// (so "m1" matches neither inside "m10" nor inside "xm1").
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}
