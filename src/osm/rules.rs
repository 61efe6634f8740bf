// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use indexmap::IndexMap;

use crate::osm::reader::Tags;
use crate::Permission;

/// Selector of the rule used when no other rule matches.
pub const DEFAULT_SELECTOR: &str = "__default__";

/// Tags which override the base permission of a way, in the order they are applied,
/// with the travel mode they control.
const MODE_OVERRIDES: [(&str, Permission); 3] = [
    ("motorcar", Permission::CAR),
    ("bicycle", Permission::BICYCLE),
    ("foot", Permission::PEDESTRIAN),
];

/// Base [Permission] for ways with a specific tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Key of the tag, e.g. "highway".
    pub key: String,

    /// Value of the tag, e.g. "residential". Rules without a value
    /// (created from a bare key selector) never match.
    pub value: Option<String>,

    pub permission: Permission,
}

impl Rule {
    fn matches(&self, tags: &Tags) -> bool {
        match (tags.get(&self.key), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        }
    }
}

/// Error returned when the access override tags can't be applied.
///
/// [PermissionRules::resolve] always starts the overrides from a base permission,
/// so this is only returned if that invariant is broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("{0} tag present, but there is no base permission to override")]
    MissingBasePermission(&'static str),
}

/// Error returned when parsing [PermissionRules] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("line {line}: expected a selector followed by a permission")]
    MissingPermission { line: usize },

    #[error("line {line}: {source}")]
    InvalidPermission {
        line: usize,
        #[source]
        source: crate::permission::UnknownPermission,
    },
}

/// Describes which travel modes may use an OSM way, based on its tags.
///
/// Rules are matched in order and the first match wins; see [PermissionRules::resolve].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRules {
    rules: Vec<Rule>,
    default: Option<Permission>,
}

impl PermissionRules {
    /// Creates rules from an ordered sequence of selectors and their permissions.
    ///
    /// A selector is either a bare key (`highway`), a `key=value` pair (`highway=primary`),
    /// or [DEFAULT_SELECTOR]. A repeated selector keeps the position of its first occurrence
    /// and the permission of its last.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Permission)>,
        S: Into<String>,
    {
        let mut ordered: IndexMap<String, Permission> = IndexMap::default();
        for (selector, permission) in entries {
            ordered.insert(selector.into(), permission);
        }

        let mut default = None;
        let mut rules = Vec::with_capacity(ordered.len());
        for (selector, permission) in ordered {
            if selector == DEFAULT_SELECTOR {
                default = Some(permission);
                continue;
            }

            let rule = match selector.split_once('=') {
                Some((key, value)) => Rule {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                    permission,
                },
                None => Rule {
                    key: selector,
                    value: None,
                    permission,
                },
            };
            rules.push(rule);
        }

        Self { rules, default }
    }

    /// Parses rules from text with a `selector PERMISSION` pair on every line,
    /// e.g. `highway=footway PEDESTRIAN`. Empty lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Result<Self, RulesError> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let (selector, permission) = line
                .split_once(char::is_whitespace)
                .ok_or(RulesError::MissingPermission { line: line_no })?;
            let permission = permission
                .trim()
                .parse::<Permission>()
                .map_err(|source| RulesError::InvalidPermission {
                    line: line_no,
                    source,
                })?;
            entries.push((selector.to_string(), permission));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Permission used when no rule matches, if configured.
    pub fn default_permission(&self) -> Option<Permission> {
        self.default
    }

    /// Keys of tags examined by [PermissionRules::resolve].
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.key.as_str())
    }

    /// Returns the [Permission] of a way with the given tags.
    ///
    /// The base permission comes from the first matching [Rule], falling back to the default
    /// rule, and then to [Permission::ALL]. The base is then overridden by the
    /// [access tags](https://wiki.openstreetmap.org/wiki/Key:access):
    /// 1. `access=no` disallows everything, any other `access` value allows everything;
    /// 2. `motorcar`, `bicycle` and `foot` (in that order) disallow their mode if set to
    ///    `no` or `private`, and allow it if set to anything else.
    ///
    /// [Permission::NONE] means the way must not be used at all.
    pub fn resolve(&self, tags: &Tags) -> Result<Permission, PermissionError> {
        let base = self.base_permission(tags);

        let access = match tags.get("access").map(String::as_str) {
            Some("no") => Some(Permission::NONE),
            Some(_) => Some(Permission::ALL),
            None if MODE_OVERRIDES.iter().any(|(key, _)| tags.contains_key(*key)) => Some(base),
            None => None,
        };

        Ok(apply_mode_overrides(access, tags)?.unwrap_or(base))
    }

    /// Returns the permission of the first matching rule, or the default one.
    fn base_permission(&self, tags: &Tags) -> Permission {
        if let Some(rule) = self.rules.iter().find(|r| r.matches(tags)) {
            return rule.permission;
        }

        match self.default {
            Some(default) => {
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("used default permissions: {}", describe_tags(tags));
                }
                default
            }
            None => {
                log::warn!(
                    "no default permissions for osm tags, assuming ALL: {}",
                    describe_tags(tags)
                );
                Permission::ALL
            }
        }
    }
}

impl Default for PermissionRules {
    /// Rules for the common [highway](https://wiki.openstreetmap.org/wiki/Key:highway) values.
    fn default() -> Self {
        Self::from_entries([
            ("highway=motorway", Permission::CAR),
            ("highway=motorway_link", Permission::CAR),
            ("highway=trunk", Permission::CAR),
            ("highway=trunk_link", Permission::CAR),
            ("highway=primary", Permission::ALL),
            ("highway=primary_link", Permission::ALL),
            ("highway=secondary", Permission::ALL),
            ("highway=secondary_link", Permission::ALL),
            ("highway=tertiary", Permission::ALL),
            ("highway=tertiary_link", Permission::ALL),
            ("highway=unclassified", Permission::ALL),
            ("highway=residential", Permission::ALL),
            ("highway=living_street", Permission::ALL),
            ("highway=road", Permission::ALL),
            ("highway=service", Permission::ALL),
            ("highway=track", Permission::ALL),
            ("highway=pedestrian", Permission::PEDESTRIAN),
            ("highway=footway", Permission::PEDESTRIAN),
            ("highway=steps", Permission::PEDESTRIAN),
            ("highway=platform", Permission::PEDESTRIAN),
            ("railway=platform", Permission::PEDESTRIAN),
            ("highway=path", Permission::PEDESTRIAN_AND_BICYCLE),
            ("highway=cycleway", Permission::PEDESTRIAN_AND_BICYCLE),
            ("highway=bridleway", Permission::NONE),
            ("highway=construction", Permission::NONE),
            ("highway=proposed", Permission::NONE),
            (DEFAULT_SELECTOR, Permission::ALL),
        ])
    }
}

/// Applies the `motorcar`, `bicycle` and `foot` tags onto `access`.
/// Fails if any of them is present while `access` is `None`.
fn apply_mode_overrides(
    mut access: Option<Permission>,
    tags: &Tags,
) -> Result<Option<Permission>, PermissionError> {
    for (key, mode) in MODE_OVERRIDES {
        if let Some(value) = tags.get(key) {
            let current = access.ok_or(PermissionError::MissingBasePermission(key))?;
            access = Some(match value.as_str() {
                "no" | "private" => current.remove(mode),
                _ => current.add(mode),
            });
        }
    }
    Ok(access)
}

fn describe_tags(tags: &Tags) -> String {
    let mut pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join("; ")
}
