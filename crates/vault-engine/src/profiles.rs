//! Built-in and user-defined search profiles. Grounded on
//! `examples/original_source/src/temoa/search_profiles.py`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeDecayConfig {
    pub half_life_days: f64,
    pub max_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProfile {
    pub name: String,
    pub semantic_weight: f32,
    pub lexical_multiplier: f32,
    pub time_decay: Option<TimeDecayConfig>,
    pub max_age_days: Option<u32>,
    pub cross_encoder: bool,
    pub chunking_enabled: bool,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub max_results_per_file: Option<usize>,
}

pub fn builtin_profiles() -> HashMap<String, SearchProfile> {
    let mut profiles = HashMap::new();

    profiles.insert(
        "repos".to_string(),
        SearchProfile {
            name: "repos".to_string(),
            semantic_weight: 0.3,
            lexical_multiplier: 2.0,
            time_decay: None,
            max_age_days: None,
            cross_encoder: false,
            chunking_enabled: false,
            chunk_size: None,
            chunk_overlap: None,
            max_results_per_file: None,
        },
    );

    profiles.insert(
        "recent".to_string(),
        SearchProfile {
            name: "recent".to_string(),
            semantic_weight: 0.5,
            lexical_multiplier: 1.0,
            time_decay: Some(TimeDecayConfig {
                half_life_days: 7.0,
                max_boost: 0.5,
            }),
            max_age_days: Some(90),
            cross_encoder: true,
            chunking_enabled: false,
            chunk_size: None,
            chunk_overlap: None,
            max_results_per_file: None,
        },
    );

    profiles.insert(
        "deep".to_string(),
        SearchProfile {
            name: "deep".to_string(),
            semantic_weight: 0.8,
            lexical_multiplier: 1.0,
            time_decay: None,
            max_age_days: None,
            cross_encoder: true,
            chunking_enabled: true,
            chunk_size: Some(2000),
            chunk_overlap: Some(400),
            max_results_per_file: Some(3),
        },
    );

    profiles.insert(
        "keywords".to_string(),
        SearchProfile {
            name: "keywords".to_string(),
            semantic_weight: 0.2,
            lexical_multiplier: 1.5,
            time_decay: None,
            max_age_days: None,
            cross_encoder: false,
            chunking_enabled: false,
            chunk_size: None,
            chunk_overlap: None,
            max_results_per_file: None,
        },
    );

    profiles.insert(
        "default".to_string(),
        SearchProfile {
            name: "default".to_string(),
            semantic_weight: 0.5,
            lexical_multiplier: 1.0,
            time_decay: Some(TimeDecayConfig {
                half_life_days: 90.0,
                max_boost: 0.2,
            }),
            max_age_days: None,
            cross_encoder: true,
            chunking_enabled: false,
            chunk_size: None,
            chunk_overlap: None,
            max_results_per_file: None,
        },
    );

    profiles
}

pub struct ProfileRegistry {
    profiles: HashMap<String, SearchProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }
}

impl ProfileRegistry {
    pub fn get(&self, name: &str) -> Option<&SearchProfile> {
        self.profiles.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Load custom profiles from a JSON map, skipping (and logging a warning
    /// for) any entry whose name collides with an existing one rather than
    /// failing the whole load.
    pub fn load_custom(&mut self, custom: HashMap<String, SearchProfile>) {
        for (name, profile) in custom {
            if self.profiles.contains_key(&name) {
                tracing::warn!(profile = %name, "skipping custom profile: name already registered");
                continue;
            }
            self.profiles.insert(name, profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_five_builtins_are_present_with_exact_values() {
        let profiles = builtin_profiles();
        assert_eq!(profiles.len(), 5);

        let repos = &profiles["repos"];
        assert_eq!(repos.semantic_weight, 0.3);
        assert_eq!(repos.lexical_multiplier, 2.0);
        assert!(repos.time_decay.is_none());
        assert!(!repos.cross_encoder);

        let recent = &profiles["recent"];
        assert_eq!(recent.semantic_weight, 0.5);
        let decay = recent.time_decay.unwrap();
        assert_eq!(decay.half_life_days, 7.0);
        assert_eq!(decay.max_boost, 0.5);
        assert_eq!(recent.max_age_days, Some(90));
        assert!(recent.cross_encoder);

        let deep = &profiles["deep"];
        assert_eq!(deep.semantic_weight, 0.8);
        assert!(deep.chunking_enabled);
        assert_eq!(deep.chunk_size, Some(2000));
        assert_eq!(deep.chunk_overlap, Some(400));
        assert_eq!(deep.max_results_per_file, Some(3));

        let keywords = &profiles["keywords"];
        assert_eq!(keywords.semantic_weight, 0.2);
        assert_eq!(keywords.lexical_multiplier, 1.5);

        let default = &profiles["default"];
        assert_eq!(default.semantic_weight, 0.5);
        let decay = default.time_decay.unwrap();
        assert_eq!(decay.half_life_days, 90.0);
        assert_eq!(decay.max_boost, 0.2);
    }

    #[test]
    fn custom_profile_colliding_with_builtin_name_is_skipped() {
        let mut registry = ProfileRegistry::default();
        let mut custom = HashMap::new();
        custom.insert(
            "default".to_string(),
            SearchProfile {
                name: "default".to_string(),
                semantic_weight: 0.99,
                lexical_multiplier: 1.0,
                time_decay: None,
                max_age_days: None,
                cross_encoder: false,
                chunking_enabled: false,
                chunk_size: None,
                chunk_overlap: None,
                max_results_per_file: None,
            },
        );
        registry.load_custom(custom);
        assert_eq!(registry.get("default").unwrap().semantic_weight, 0.5);
    }

    #[test]
    fn custom_profile_with_new_name_is_registered() {
        let mut registry = ProfileRegistry::default();
        let mut custom = HashMap::new();
        custom.insert(
            "archive".to_string(),
            SearchProfile {
                name: "archive".to_string(),
                semantic_weight: 0.6,
                lexical_multiplier: 1.0,
                time_decay: None,
                max_age_days: None,
                cross_encoder: false,
                chunking_enabled: false,
                chunk_size: None,
                chunk_overlap: None,
                max_results_per_file: None,
            },
        );
        registry.load_custom(custom);
        assert!(registry.get("archive").is_some());
        assert_eq!(registry.list().len(), 6);
    }
}
