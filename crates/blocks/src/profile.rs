use std::collections::BTreeMap;
use std::time::Duration;

use config::{DeliveryMode, ProfileConfig};

use crate::error::ProfileError;

/// The capability envelope of one delivery destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelProfile {
    /// Registry key, e.g. `telegram`.
    pub name: String,
    /// Maximum characters per block; `None` means unbounded.
    pub max_chars: Option<usize>,
    /// Maximum lines per block; `None` means unbounded.
    pub max_lines: Option<usize>,
    /// Characters withheld before a block may be emitted.
    pub min_chars: usize,
    /// Whether the destination can edit an already-sent message.
    pub supports_edit: bool,
    /// Whether the destination renders markdown.
    pub supports_markdown: bool,
    /// Idle gap under which small adjacent chunks are merged; zero makes
    /// streaming updates immediate.
    pub coalesce_gap: Duration,
    /// Delivery mode used when the caller does not pick one.
    pub default_mode: DeliveryMode,
}

impl ChannelProfile {
    /// Builds a profile from a configuration file entry.
    pub fn from_config(name: &str, config: &ProfileConfig) -> Self {
        Self {
            name: name.to_string(),
            max_chars: config.max_chars,
            max_lines: config.max_lines,
            min_chars: config.min_chars,
            supports_edit: config.supports_edit,
            supports_markdown: config.supports_markdown,
            coalesce_gap: config.coalesce_gap,
            default_mode: config.default_mode,
        }
    }

    /// Checks the budget invariants.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.is_empty() {
            return Err(ProfileError::MissingName);
        }

        if self.min_chars == 0 {
            return Err(ProfileError::MissingMinChars(self.name.clone()));
        }

        if let Some(max_chars) = self.max_chars
            && max_chars < self.min_chars
        {
            return Err(ProfileError::InvalidCharBudget {
                name: self.name.clone(),
                max_chars,
                min_chars: self.min_chars,
            });
        }

        if self.max_lines == Some(0) {
            return Err(ProfileError::InvalidLineBudget(self.name.clone()));
        }

        Ok(())
    }
}

macro_rules! builtin {
    ($name:literal, $max_chars:expr, $max_lines:expr, $min_chars:expr, $edit:expr, $markdown:expr, $gap_ms:expr, $mode:expr) => {
        ChannelProfile {
            name: $name.to_string(),
            max_chars: $max_chars,
            max_lines: $max_lines,
            min_chars: $min_chars,
            supports_edit: $edit,
            supports_markdown: $markdown,
            coalesce_gap: Duration::from_millis($gap_ms),
            default_mode: $mode,
        }
    };
}

fn builtin_profiles() -> Vec<ChannelProfile> {
    use DeliveryMode::{Block, Streaming};

    vec![
        builtin!("telegram", Some(4096), None, 100, true, true, 200, Streaming),
        builtin!("whatsapp", Some(65536), None, 200, false, false, 500, Block),
        builtin!("discord", Some(2000), Some(17), 150, true, true, 300, Streaming),
        builtin!("slack", Some(40000), None, 200, true, true, 400, Block),
        builtin!("web", None, None, 1, true, true, 0, Streaming),
        builtin!("console", None, None, 1, false, false, 0, Streaming),
    ]
}

/// Named channel profiles, seeded with the built-in set.
///
/// Constructed once at gateway startup and passed down; nothing in the crate
/// reaches for a process-wide registry.
#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ChannelProfile>,
}

impl ProfileRegistry {
    /// Creates a registry holding the built-in profiles.
    pub fn with_defaults() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|profile| (profile.name.clone(), profile))
            .collect();

        Self { profiles }
    }

    /// Registers a profile, replacing any existing entry with the same name.
    pub fn register(&mut self, profile: ChannelProfile) -> Result<(), ProfileError> {
        profile.validate()?;
        self.profiles.insert(profile.name.clone(), profile);

        Ok(())
    }

    /// Merges configuration file entries over the current set.
    pub fn apply_config(&mut self, entries: &BTreeMap<String, ProfileConfig>) -> Result<(), ProfileError> {
        for (name, entry) in entries {
            self.register(ChannelProfile::from_config(name, entry))?;
        }

        Ok(())
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> Option<&ChannelProfile> {
        self.profiles.get(name)
    }

    /// Resolves a profile or reports it unknown.
    pub fn resolve(&self, name: &str) -> Result<ChannelProfile, ProfileError> {
        self.get(name).cloned().ok_or_else(|| ProfileError::Unknown(name.to_string()))
    }

    /// Registered profile names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}
