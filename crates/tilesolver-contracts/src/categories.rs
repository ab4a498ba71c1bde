use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f32 = 0.55;

/// Prompt configuration for one target-object category.
///
/// `positive_prompts` describe tiles that contain the object,
/// `negative_prompts` describe tiles that do not. The classifier matches a
/// tile when the probability mass assigned to the positive prompts exceeds
/// `threshold` (strict).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub positive_prompts: Vec<String>,
    pub negative_prompts: Vec<String>,
    pub threshold: f32,
}

impl CategoryConfig {
    /// Full prompt list handed to the similarity scorer: positives first,
    /// order preserved.
    pub fn full_prompts(&self) -> Vec<String> {
        let mut prompts = self.positive_prompts.clone();
        prompts.extend(self.negative_prompts.iter().cloned());
        prompts
    }

    pub fn positive_count(&self) -> usize {
        self.positive_prompts.len()
    }
}

/// Outcome of a registry lookup. Lookup never fails for a non-empty label:
/// unknown labels get a synthesized fallback config.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCategory {
    Known { name: String, config: CategoryConfig },
    Fallback { config: CategoryConfig },
}

impl ResolvedCategory {
    pub fn config(&self) -> &CategoryConfig {
        match self {
            ResolvedCategory::Known { config, .. } => config,
            ResolvedCategory::Fallback { config } => config,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ResolvedCategory::Known { name, .. } => Some(name.as_str()),
            ResolvedCategory::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ResolvedCategory::Fallback { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: IndexMap<String, CategoryConfig>,
}

impl CategoryRegistry {
    pub fn new(categories: Option<IndexMap<String, CategoryConfig>>) -> Self {
        Self {
            categories: categories.unwrap_or_else(default_categories),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &CategoryConfig)> {
        self.categories
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    /// Resolves a raw challenge instruction label to a category config.
    ///
    /// Normalizes the label, tries an exact entry, then the alias rules,
    /// then synthesizes a fallback config from the label itself. Callers
    /// resolve once per round and hand the result to the classifier, so
    /// alias rules are applied in exactly one place.
    pub fn resolve(&self, label: &str) -> ResolvedCategory {
        let normalized = normalize_label(label);

        if let Some(config) = self.categories.get(normalized.as_str()) {
            return ResolvedCategory::Known {
                name: normalized,
                config: config.clone(),
            };
        }

        if let Some(name) = alias_target(&normalized) {
            if let Some(config) = self.categories.get(name) {
                return ResolvedCategory::Known {
                    name: name.to_string(),
                    config: config.clone(),
                };
            }
        }

        ResolvedCategory::Fallback {
            config: fallback_config(&normalized),
        }
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Lower-cases, trims, and collapses internal whitespace runs.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps instruction phrasings onto registry entries. Challenge text rarely
/// uses the bare category name ("select all squares with fire hydrants"),
/// so needles are matched as whole words of the normalized label, with
/// plural tolerance on the final word. Short needles like "bus" or "car"
/// must not fire inside unrelated words ("bushes", "scarves").
fn alias_target(normalized: &str) -> Option<&'static str> {
    let words: Vec<&str> = normalized.split(' ').collect();
    let rules: &[(&[&str], &str)] = &[
        (&["hydrant", "fire"], "fire hydrant"),
        (&["crosswalk", "cross walk", "pedestrian crossing"], "crosswalk"),
        (&["traffic light", "traffic signal", "stoplight"], "traffic light"),
        (&["motorcycle", "motorbike"], "motorcycle"),
        (&["bicycle", "bike"], "bicycle"),
        (&["bus"], "bus"),
        (&["taxi", "cab"], "taxi"),
        (&["vehicle", "car"], "car"),
        (&["stair"], "stairs"),
        (&["chimney"], "chimney"),
        (&["bridge"], "bridge"),
        (&["boat"], "boat"),
        (&["palm"], "palm tree"),
        (&["parking meter"], "parking meter"),
        (&["tractor"], "tractor"),
    ];
    for (needles, target) in rules {
        if needles.iter().any(|needle| phrase_present(&words, needle)) {
            return Some(target);
        }
    }
    None
}

fn phrase_present(words: &[&str], needle: &str) -> bool {
    let parts: Vec<&str> = needle.split(' ').collect();
    words.windows(parts.len()).any(|window| {
        window.iter().enumerate().all(|(idx, word)| {
            if idx + 1 == parts.len() {
                word_matches(word, parts[idx])
            } else {
                *word == parts[idx]
            }
        })
    })
}

fn word_matches(word: &str, needle: &str) -> bool {
    word == needle
        || word.strip_suffix('s') == Some(needle)
        || word.strip_suffix("es") == Some(needle)
}

fn fallback_config(normalized: &str) -> CategoryConfig {
    CategoryConfig {
        positive_prompts: vec![format!("a photo of {normalized}")],
        negative_prompts: default_negative_prompts(),
        threshold: DEFAULT_THRESHOLD,
    }
}

fn default_negative_prompts() -> Vec<String> {
    [
        "a photo of an empty street",
        "a photo of a building facade",
        "a photo of the sky",
        "a blurry photo of pavement",
    ]
    .iter()
    .map(|item| (*item).to_string())
    .collect()
}

fn default_categories() -> IndexMap<String, CategoryConfig> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, positives: &[&str], negatives: &[&str], threshold: f32| {
        map.insert(
            name.to_string(),
            CategoryConfig {
                positive_prompts: positives.iter().map(|item| (*item).to_string()).collect(),
                negative_prompts: negatives.iter().map(|item| (*item).to_string()).collect(),
                threshold,
            },
        );
    };

    insert(
        "bicycle",
        &["a photo of a bicycle", "a street photo with a bicycle in it"],
        &[
            "a photo of a street with no bicycle",
            "a photo of a car",
            "a photo of an empty road",
        ],
        0.55,
    );
    insert(
        "bus",
        &["a photo of a bus", "a photo of a large passenger bus on a road"],
        &[
            "a photo of a car",
            "a photo of a truck",
            "a photo of a street with no bus",
        ],
        0.55,
    );
    insert(
        "car",
        &["a photo of a car", "a photo of a vehicle on a street"],
        &[
            "a photo of an empty street",
            "a photo of a building",
            "a photo of a tree",
        ],
        0.55,
    );
    insert(
        "crosswalk",
        &[
            "a photo of a crosswalk",
            "a photo of white pedestrian crossing stripes on a road",
        ],
        &[
            "a photo of plain asphalt",
            "a photo of a sidewalk without markings",
            "a photo of a road with no crosswalk",
        ],
        0.5,
    );
    insert(
        "fire hydrant",
        &["a photo of a fire hydrant", "a close-up photo of a fire hydrant"],
        &[
            "a photo of a street with no hydrant",
            "a photo of a pole",
            "a photo of a mailbox",
        ],
        0.6,
    );
    insert(
        "motorcycle",
        &["a photo of a motorcycle", "a photo of a motorbike parked or riding"],
        &[
            "a photo of a bicycle",
            "a photo of a car",
            "a photo of an empty road",
        ],
        0.55,
    );
    insert(
        "traffic light",
        &[
            "a photo of a traffic light",
            "a photo of a signal with red, yellow, and green lights",
        ],
        &[
            "a photo of a street lamp",
            "a photo of a road sign",
            "a photo of the sky with wires",
        ],
        0.55,
    );
    insert(
        "stairs",
        &["a photo of stairs", "a photo of a staircase or outdoor steps"],
        &[
            "a photo of a flat sidewalk",
            "a photo of a ramp",
            "a photo of a building wall",
        ],
        0.5,
    );
    insert(
        "chimney",
        &["a photo of a chimney", "a photo of a chimney on a rooftop"],
        &[
            "a photo of a roof with no chimney",
            "a photo of the sky",
            "a photo of a wall",
        ],
        0.55,
    );
    insert(
        "bridge",
        &["a photo of a bridge", "a photo of a bridge over water or a road"],
        &[
            "a photo of a road with no bridge",
            "a photo of a river bank",
            "a photo of buildings",
        ],
        0.5,
    );
    insert(
        "boat",
        &["a photo of a boat", "a photo of a boat on the water"],
        &[
            "a photo of open water with no boat",
            "a photo of a dock",
            "a photo of a car",
        ],
        0.55,
    );
    insert(
        "palm tree",
        &["a photo of a palm tree", "a photo of palm fronds against the sky"],
        &[
            "a photo of a pine tree",
            "a photo of a leafless tree",
            "a photo of a street with no trees",
        ],
        0.55,
    );
    insert(
        "parking meter",
        &["a photo of a parking meter", "a photo of a coin parking meter on a sidewalk"],
        &[
            "a photo of a pole",
            "a photo of a fire hydrant",
            "a photo of a sidewalk with no meter",
        ],
        0.6,
    );
    insert(
        "tractor",
        &["a photo of a tractor", "a photo of farm machinery in a field"],
        &[
            "a photo of a car",
            "a photo of a truck",
            "a photo of an empty field",
        ],
        0.55,
    );
    insert(
        "taxi",
        &["a photo of a taxi", "a photo of a yellow taxi cab"],
        &[
            "a photo of a private car",
            "a photo of a bus",
            "a photo of an empty street",
        ],
        0.55,
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup_resolves_known_category() {
        let registry = CategoryRegistry::default();
        let resolved = registry.resolve("crosswalk");
        assert_eq!(resolved.name(), Some("crosswalk"));
        assert!(!resolved.is_fallback());
    }

    #[test]
    fn labels_are_normalized_before_lookup() {
        let registry = CategoryRegistry::default();
        let resolved = registry.resolve("  Traffic   Light ");
        assert_eq!(resolved.name(), Some("traffic light"));
    }

    #[test]
    fn alias_rules_map_instruction_phrasings() {
        let registry = CategoryRegistry::default();
        assert_eq!(
            registry.resolve("select all squares with fire hydrants").name(),
            Some("fire hydrant")
        );
        assert_eq!(registry.resolve("vehicles").name(), Some("car"));
        assert_eq!(registry.resolve("bikes").name(), Some("bicycle"));
        assert_eq!(registry.resolve("a cross walk").name(), Some("crosswalk"));
    }

    #[test]
    fn alias_words_tolerate_plural_forms() {
        let registry = CategoryRegistry::default();
        assert_eq!(registry.resolve("buses").name(), Some("bus"));
        assert_eq!(registry.resolve("motorbikes").name(), Some("motorcycle"));
        assert_eq!(registry.resolve("traffic lights").name(), Some("traffic light"));
    }

    #[test]
    fn alias_words_do_not_fire_inside_longer_words() {
        let registry = CategoryRegistry::default();
        // "scarves" is not a car and "bushes" is not a bus.
        assert!(registry.resolve("scarves").is_fallback());
        assert!(registry.resolve("bushes").is_fallback());
        assert!(registry.resolve("select all squares with bushes").is_fallback());
    }

    #[test]
    fn unknown_label_falls_back_with_synthesized_prompt() {
        let registry = CategoryRegistry::default();
        let resolved = registry.resolve("Storefronts");
        assert!(resolved.is_fallback());
        let config = resolved.config();
        assert_eq!(config.positive_prompts, vec!["a photo of storefronts"]);
        assert!(!config.negative_prompts.is_empty());
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn full_prompts_keep_positives_first_in_order() {
        let config = CategoryConfig {
            positive_prompts: vec!["p1".to_string(), "p2".to_string()],
            negative_prompts: vec!["n1".to_string()],
            threshold: 0.5,
        };
        assert_eq!(config.full_prompts(), vec!["p1", "p2", "n1"]);
        assert_eq!(config.positive_count(), 2);
    }

    #[test]
    fn every_builtin_threshold_is_a_probability() {
        let registry = CategoryRegistry::default();
        for (name, config) in registry.list() {
            assert!(
                (0.0..=1.0).contains(&config.threshold),
                "threshold out of range for {name}"
            );
            assert!(!config.positive_prompts.is_empty(), "no positives for {name}");
            assert!(!config.negative_prompts.is_empty(), "no negatives for {name}");
        }
    }
}
