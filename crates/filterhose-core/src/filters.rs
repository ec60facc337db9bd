use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The kinds of filter the endpoint accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCategory {
    Tracking,
    Location,
    Follow,
    Language,
}

impl FilterCategory {
    pub const ALL: [FilterCategory; 4] = [
        FilterCategory::Tracking,
        FilterCategory::Location,
        FilterCategory::Follow,
        FilterCategory::Language,
    ];

    /// Name of the form field this category is sent as.
    pub fn form_field(self) -> &'static str {
        match self {
            Self::Tracking => "track",
            Self::Location => "locations",
            Self::Follow => "follow",
            Self::Language => "language",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Tracking => 0,
            Self::Location => 1,
            Self::Follow => 2,
            Self::Language => 3,
        }
    }
}

impl std::fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tracking => f.write_str("tracking"),
            Self::Location => f.write_str("location"),
            Self::Follow => f.write_str("follow"),
            Self::Language => f.write_str("language"),
        }
    }
}

/// Reference-counted values of one category, in first-insertion order.
#[derive(Clone, Debug, Default)]
pub struct FilterSet {
    counts: IndexMap<String, u32>,
}

impl FilterSet {
    /// Returns true when the value was not present before.
    pub fn add(&mut self, value: &str) -> bool {
        if let Some(count) = self.counts.get_mut(value) {
            *count += 1;
            false
        } else {
            self.counts.insert(value.to_string(), 1);
            true
        }
    }

    /// Returns true when the last reference was dropped.
    pub fn remove(&mut self, value: &str) -> bool {
        let Some(count) = self.counts.get_mut(value) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.shift_remove(value);
            true
        } else {
            false
        }
    }

    pub fn count(&self, value: &str) -> u32 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn joined(&self) -> String {
        self.values().collect::<Vec<_>>().join(",")
    }
}

/// All active filters plus a dirty flag recording unsent membership changes.
///
/// Mutation never performs I/O; it only flips `dirty`, which the supervisor
/// clears when it takes a snapshot to connect with.
#[derive(Clone, Debug, Default)]
pub struct FilterRegistry {
    sets: [FilterSet; 4],
    dirty: bool,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference. Empty values are ignored.
    pub fn add(&mut self, category: FilterCategory, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        let changed = self.sets[category.index()].add(value);
        self.dirty |= changed;
        changed
    }

    /// Drop one reference. Removing an absent value is a no-op.
    pub fn remove(&mut self, category: FilterCategory, value: &str) -> bool {
        let changed = self.sets[category.index()].remove(value);
        self.dirty |= changed;
        changed
    }

    /// Add several values; true if any of them changed membership.
    pub fn add_many<I, S>(&mut self, category: FilterCategory, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .fold(false, |changed, v| self.add(category, v.as_ref()) | changed)
    }

    pub fn remove_many<I, S>(&mut self, category: FilterCategory, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .fold(false, |changed, v| self.remove(category, v.as_ref()) | changed)
    }

    pub fn set(&self, category: FilterCategory) -> &FilterSet {
        &self.sets[category.index()]
    }

    pub fn values(&self, category: FilterCategory) -> Vec<String> {
        self.set(category).values().map(str::to_string).collect()
    }

    pub fn count(&self, category: FilterCategory, value: &str) -> u32 {
        self.set(category).count(value)
    }

    pub fn has_any(&self) -> bool {
        self.sets.iter().any(|s| !s.is_empty())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            track: self.set(FilterCategory::Tracking).joined(),
            locations: self.set(FilterCategory::Location).joined(),
            follow: self.set(FilterCategory::Follow).joined(),
            language: self.set(FilterCategory::Language).joined(),
        }
    }

    /// Snapshot for a connection attempt; clears the dirty flag.
    pub fn take_snapshot(&mut self) -> FilterSnapshot {
        self.dirty = false;
        self.snapshot()
    }
}

/// Comma-joined values per category, as sent in the request body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterSnapshot {
    pub track: String,
    pub locations: String,
    pub follow: String,
    pub language: String,
}

impl FilterSnapshot {
    pub fn get(&self, category: FilterCategory) -> &str {
        match category {
            FilterCategory::Tracking => &self.track,
            FilterCategory::Location => &self.locations,
            FilterCategory::Follow => &self.follow,
            FilterCategory::Language => &self.language,
        }
    }

    pub fn is_empty(&self) -> bool {
        FilterCategory::ALL.iter().all(|c| self.get(*c).is_empty())
    }

    /// Form fields in wire order. Empty categories are sent as empty strings.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        FilterCategory::ALL
            .iter()
            .map(|c| (c.form_field().to_string(), self.get(*c).to_string()))
            .collect()
    }
}
