//! Milestone registry: the immutable-after-load configuration model.
//!
//! A registry instance is built once from a [`Config`], validated, and never
//! mutated. Reload constructs a fresh instance and publishes it through
//! [`RegistryHandle`] with an atomic swap; operations capture a snapshot at
//! start and finish against it, so readers never observe partial state.
//!
//! Loading is deliberately forgiving: a malformed resource, level, or group
//! entry is skipped and reported as a [`ConfigIssue`] rather than failing the
//! whole load, because a partially broken milestone configuration must not
//! take the host down.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use log::warn;
use serde::Deserialize;

use crate::config::Config;
use crate::milestone::types::MilestoneLevel;
use crate::validation::{normalize_resource_key, unknown_placeholders};

/// A non-fatal problem found while building the registry. Collected for the
/// operator (`lodestone validate`) and logged at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    MalformedResource {
        resource: String,
        detail: String,
    },
    MalformedLevel {
        resource: String,
        detail: String,
    },
    DuplicateLevel {
        resource: String,
        level: u32,
    },
    MalformedGroup {
        group: String,
        detail: String,
    },
    /// A group references a resource with no milestone definition.
    UnknownGroupMember {
        group: String,
        resource: String,
    },
    /// A resource appears in more than one group; the first keeps it.
    DuplicateGroupMember {
        resource: String,
        first_group: String,
        second_group: String,
    },
    UnknownPlaceholder {
        resource: String,
        level: u32,
        placeholder: String,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::MalformedResource { resource, detail } => {
                write!(f, "resource {resource} skipped: {detail}")
            }
            ConfigIssue::MalformedLevel { resource, detail } => {
                write!(f, "level skipped for {resource}: {detail}")
            }
            ConfigIssue::DuplicateLevel { resource, level } => {
                write!(f, "duplicate level {level} for {resource}; keeping the first")
            }
            ConfigIssue::MalformedGroup { group, detail } => {
                write!(f, "group {group} degraded: {detail}")
            }
            ConfigIssue::UnknownGroupMember { group, resource } => {
                write!(f, "group {group} references unknown resource {resource}")
            }
            ConfigIssue::DuplicateGroupMember {
                resource,
                first_group,
                second_group,
            } => write!(
                f,
                "resource {resource} already in group {first_group}; ignoring membership in {second_group}"
            ),
            ConfigIssue::UnknownPlaceholder {
                resource,
                level,
                placeholder,
            } => write!(
                f,
                "unknown placeholder {{{placeholder}}} in action for {resource} level {level}"
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceEntry {
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    levels: Vec<LevelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct LevelEntry {
    level: u32,
    threshold: u64,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    on_cross: Option<String>,
    #[serde(default)]
    on_claim: Option<String>,
}

/// Immutable milestone configuration: levels per resource and resolved
/// link-group member lists.
#[derive(Debug, Default)]
pub struct MilestoneRegistry {
    /// Levels in configuration order per resource.
    resources: HashMap<String, Vec<MilestoneLevel>>,
    display_names: HashMap<String, String>,
    /// Resource -> full member list of its link group, itself included.
    /// Grouped resources share one list; ungrouped ones get a singleton.
    members: HashMap<String, Arc<Vec<String>>>,
    /// Resource -> owning group name, for display only.
    group_names: HashMap<String, String>,
}

impl MilestoneRegistry {
    /// Build a registry from configuration, collecting per-entry issues.
    /// Entries are processed in sorted key order so issue reporting and
    /// duplicate-membership resolution are deterministic.
    pub fn load(config: &Config) -> (Self, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut resources: HashMap<String, Vec<MilestoneLevel>> = HashMap::new();
        let mut display_names = HashMap::new();

        let mut resource_keys: Vec<&String> = config.milestones.keys().collect();
        resource_keys.sort();
        for raw_key in resource_keys {
            let key = match normalize_resource_key(raw_key) {
                Ok(key) => key,
                Err(e) => {
                    issues.push(ConfigIssue::MalformedResource {
                        resource: raw_key.clone(),
                        detail: e.to_string(),
                    });
                    continue;
                }
            };
            let entry: ResourceEntry = match config.milestones[raw_key].clone().try_into() {
                Ok(entry) => entry,
                Err(e) => {
                    issues.push(ConfigIssue::MalformedResource {
                        resource: key,
                        detail: e.to_string(),
                    });
                    continue;
                }
            };

            let mut levels = Vec::new();
            let mut seen = HashSet::new();
            for lvl in entry.levels {
                if lvl.level == 0 {
                    issues.push(ConfigIssue::MalformedLevel {
                        resource: key.clone(),
                        detail: "level ordinal must be positive".to_string(),
                    });
                    continue;
                }
                if lvl.threshold == 0 {
                    issues.push(ConfigIssue::MalformedLevel {
                        resource: key.clone(),
                        detail: format!("level {} threshold must be positive", lvl.level),
                    });
                    continue;
                }
                if !seen.insert(lvl.level) {
                    issues.push(ConfigIssue::DuplicateLevel {
                        resource: key.clone(),
                        level: lvl.level,
                    });
                    continue;
                }
                for template in [&lvl.on_cross, &lvl.on_claim].into_iter().flatten() {
                    for placeholder in unknown_placeholders(template) {
                        issues.push(ConfigIssue::UnknownPlaceholder {
                            resource: key.clone(),
                            level: lvl.level,
                            placeholder,
                        });
                    }
                }
                levels.push(MilestoneLevel {
                    level: lvl.level,
                    threshold: lvl.threshold,
                    display: lvl.display,
                    on_cross: lvl.on_cross,
                    on_claim: lvl.on_claim,
                });
            }

            if levels.is_empty() {
                issues.push(ConfigIssue::MalformedResource {
                    resource: key,
                    detail: "no valid levels".to_string(),
                });
                continue;
            }
            if let Some(display) = entry.display {
                display_names.insert(key.clone(), display);
            }
            resources.insert(key, levels);
        }

        // Group membership: validate symmetry (one group per resource, known
        // members only) and degrade failures to "ungrouped".
        let mut owner: HashMap<String, String> = HashMap::new();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        let mut group_keys: Vec<&String> = config.groups.keys().collect();
        group_keys.sort();
        for group in group_keys {
            let raw_members: Vec<String> = match config.groups[group].clone().try_into() {
                Ok(members) => members,
                Err(e) => {
                    issues.push(ConfigIssue::MalformedGroup {
                        group: group.clone(),
                        detail: e.to_string(),
                    });
                    continue;
                }
            };
            let mut members = Vec::new();
            for raw in raw_members {
                let key = match normalize_resource_key(&raw) {
                    Ok(key) => key,
                    Err(e) => {
                        issues.push(ConfigIssue::MalformedGroup {
                            group: group.clone(),
                            detail: format!("member {raw:?}: {e}"),
                        });
                        continue;
                    }
                };
                if !resources.contains_key(&key) {
                    issues.push(ConfigIssue::UnknownGroupMember {
                        group: group.clone(),
                        resource: key,
                    });
                    continue;
                }
                if members.contains(&key) {
                    continue;
                }
                if let Some(first) = owner.get(&key) {
                    issues.push(ConfigIssue::DuplicateGroupMember {
                        resource: key,
                        first_group: first.clone(),
                        second_group: group.clone(),
                    });
                    continue;
                }
                owner.insert(key.clone(), group.clone());
                members.push(key);
            }
            if !members.is_empty() {
                groups.insert(group.clone(), members);
            }
        }

        let mut members_map: HashMap<String, Arc<Vec<String>>> = HashMap::new();
        for member_list in groups.values() {
            let shared = Arc::new(member_list.clone());
            for member in member_list {
                members_map.insert(member.clone(), shared.clone());
            }
        }
        for resource in resources.keys() {
            if !members_map.contains_key(resource) {
                members_map.insert(resource.clone(), Arc::new(vec![resource.clone()]));
            }
        }

        for issue in &issues {
            warn!("milestone config: {issue}");
        }

        (
            Self {
                resources,
                display_names,
                members: members_map,
                group_names: owner,
            },
            issues,
        )
    }

    pub fn is_tracked(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    /// Levels for a resource in configuration order; empty if untracked.
    pub fn levels(&self, resource: &str) -> &[MilestoneLevel] {
        self.resources
            .get(resource)
            .map(|levels| levels.as_slice())
            .unwrap_or(&[])
    }

    pub fn level(&self, resource: &str, ordinal: u32) -> Option<&MilestoneLevel> {
        self.levels(resource).iter().find(|l| l.level == ordinal)
    }

    /// Full member list of the resource's link group, the resource itself
    /// included; empty for untracked resources.
    pub fn link_group(&self, resource: &str) -> &[String] {
        self.members
            .get(resource)
            .map(|members| members.as_slice())
            .unwrap_or(&[])
    }

    /// Name of the group the resource belongs to, if any.
    pub fn group_name(&self, resource: &str) -> Option<&str> {
        self.group_names.get(resource).map(String::as_str)
    }

    pub fn display(&self, resource: &str) -> Option<&str> {
        self.display_names.get(resource).map(String::as_str)
    }

    /// Tracked resource keys in sorted order.
    pub fn resources(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Shared handle to the current registry. `current()` snapshots, `replace()`
/// publishes a new instance atomically; in-flight operations keep the
/// snapshot they captured.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Arc<MilestoneRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: MilestoneRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub fn current(&self) -> Arc<MilestoneRegistry> {
        self.inner
            .read()
            .expect("registry handle poisoned")
            .clone()
    }

    pub fn replace(&self, registry: MilestoneRegistry) {
        *self.inner.write().expect("registry handle poisoned") = Arc::new(registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;

    fn load(toml: &str) -> (MilestoneRegistry, Vec<ConfigIssue>) {
        let config = Config::parse(toml).unwrap();
        MilestoneRegistry::load(&config)
    }

    #[test]
    fn default_config_loads_clean() {
        let (registry, issues) = load(DEFAULT_CONFIG);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        assert!(registry.is_tracked("iron_ore"));
        assert_eq!(registry.levels("iron_ore").len(), 2);
        assert_eq!(registry.link_group("oak_log"), ["oak_log", "birch_log"]);
        assert_eq!(registry.group_name("birch_log"), Some("logs"));
        assert_eq!(registry.link_group("iron_ore"), ["iron_ore"]);
        assert!(registry.group_name("iron_ore").is_none());
    }

    #[test]
    fn malformed_resource_is_skipped_not_fatal() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [milestones.iron_ore]
            levels = "not an array"

            [[milestones.coal.levels]]
            level = 1
            threshold = 10
            "#,
        );
        assert!(!registry.is_tracked("iron_ore"));
        assert!(registry.is_tracked("coal"));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::MalformedResource { resource, .. } if resource == "iron_ore")));
    }

    #[test]
    fn bad_levels_are_skipped_individually() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [[milestones.coal.levels]]
            level = 0
            threshold = 10

            [[milestones.coal.levels]]
            level = 1
            threshold = 0

            [[milestones.coal.levels]]
            level = 2
            threshold = 20

            [[milestones.coal.levels]]
            level = 2
            threshold = 30
            "#,
        );
        let levels = registry.levels("coal");
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].level, 2);
        assert_eq!(levels[0].threshold, 20);
        assert_eq!(issues.len(), 3);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::DuplicateLevel { level: 2, .. })));
    }

    #[test]
    fn resource_with_no_valid_levels_is_untracked() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [[milestones.coal.levels]]
            level = 1
            threshold = 0
            "#,
        );
        assert!(!registry.is_tracked("coal"));
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn malformed_group_degrades_to_ungrouped() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [groups]
            logs = 42

            [[milestones.oak_log.levels]]
            level = 1
            threshold = 50
            "#,
        );
        assert_eq!(registry.link_group("oak_log"), ["oak_log"]);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::MalformedGroup { group, .. } if group == "logs")));
    }

    #[test]
    fn resource_stays_with_its_first_group() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [groups]
            alpha = ["oak_log"]
            beta = ["oak_log", "birch_log"]

            [[milestones.oak_log.levels]]
            level = 1
            threshold = 50

            [[milestones.birch_log.levels]]
            level = 1
            threshold = 50
            "#,
        );
        assert_eq!(registry.group_name("oak_log"), Some("alpha"));
        assert_eq!(registry.group_name("birch_log"), Some("beta"));
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigIssue::DuplicateGroupMember { resource, second_group, .. }
                if resource == "oak_log" && second_group == "beta"
        )));
    }

    #[test]
    fn unknown_group_member_is_dropped() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [groups]
            logs = ["oak_log", "spruce_log"]

            [[milestones.oak_log.levels]]
            level = 1
            threshold = 50
            "#,
        );
        assert_eq!(registry.link_group("oak_log"), ["oak_log"]);
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigIssue::UnknownGroupMember { resource, .. } if resource == "spruce_log"
        )));
    }

    #[test]
    fn unknown_placeholder_is_flagged_but_level_kept() {
        let (registry, issues) = load(
            r#"
            [storage]
            data_dir = "./data"

            [[milestones.coal.levels]]
            level = 1
            threshold = 10
            on_claim = "give {palyer} coal_reward"
            "#,
        );
        assert!(registry.level("coal", 1).is_some());
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigIssue::UnknownPlaceholder { placeholder, .. } if placeholder == "palyer"
        )));
    }

    #[test]
    fn handle_swaps_atomically_and_keeps_old_snapshots_valid() {
        let (first, _) = load(DEFAULT_CONFIG);
        let handle = RegistryHandle::new(first);
        let snapshot = handle.current();
        assert!(snapshot.is_tracked("iron_ore"));

        let (second, _) = load("[storage]\ndata_dir = \"./data\"\n");
        handle.replace(second);
        // Old snapshot still answers from the instance it captured.
        assert!(snapshot.is_tracked("iron_ore"));
        assert!(!handle.current().is_tracked("iron_ore"));
    }
}
