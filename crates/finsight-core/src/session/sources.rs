use serde::{Deserialize, Serialize};

use crate::session::types::SourceName;

/// Display category for a citation source. The backend sends open-ended
/// strings; anything unrecognized collapses into `Generic` so the UI always
/// has an exhaustive mapping to work with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceIcon {
    News,
    Stock,
    Dart,
    Edgar,
    #[default]
    Generic,
}

impl<'de> Deserialize<'de> for SourceIcon {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Unknown categories are display-only, so they degrade rather
        // than fail deserialization.
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Backend-supplied display fields. Opaque to the session core; carried
/// through for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_content: Option<String>,
}

/// A citation backing an answer. Expansion state belongs to the UI but lives
/// here so it survives `ask` merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: SourceName,
    #[serde(default)]
    pub icon: SourceIcon,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

impl Source {
    pub fn new(name: impl Into<SourceName>) -> Self {
        Self {
            name: name.into(),
            icon: SourceIcon::default(),
            expanded: false,
            metadata: SourceMetadata::default(),
        }
    }

    pub fn with_icon(mut self, icon: SourceIcon) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Deduplicated source bookkeeping for the current topic. Insertion order is
/// the backend's ranking and is preserved across upserts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    entries: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges by name. New entries arrive collapsed; existing entries keep
    /// their current `expanded` and take the incoming icon and metadata.
    pub fn upsert(&mut self, incoming: impl IntoIterator<Item = Source>) {
        for source in incoming {
            match self.entries.iter_mut().find(|s| s.name == source.name) {
                Some(existing) => {
                    existing.icon = source.icon;
                    existing.metadata = source.metadata;
                }
                None => {
                    self.entries.push(Source {
                        expanded: false,
                        ..source
                    });
                }
            }
        }
    }

    /// Flips `expanded`, or sets it directly when an override is given.
    /// Returns false (and changes nothing) for an unknown name.
    pub fn toggle(&mut self, name: &SourceName, expanded: Option<bool>) -> bool {
        match self.entries.iter_mut().find(|s| &s.name == name) {
            Some(source) => {
                source.expanded = expanded.unwrap_or(!source.expanded);
                true
            }
            None => false,
        }
    }

    /// Drops every entry and installs the given set fresh. Used by the
    /// `search` reset; expansion state does not survive it.
    pub fn replace_all(&mut self, sources: impl IntoIterator<Item = Source>) {
        self.entries.clear();
        self.upsert(sources);
    }

    pub fn get(&self, name: &SourceName) -> Option<&Source> {
        self.entries.iter().find(|s| &s.name == name)
    }

    pub fn contains(&self, name: &SourceName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &SourceName> {
        self.entries.iter().map(|s| &s.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
