use serde::{Deserialize, Serialize};

use crate::ClassId;

/// One class in a user's label registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    /// Assigned by the registry; ignored on input.
    #[serde(default)]
    pub id: ClassId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl LabelEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Name followed by aliases, normalized (trimmed, lower-cased).
    pub fn all_names(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|n| normalize(n))
    }
}

/// A requested name that is already bound to a different class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConflict {
    pub name: String,
    pub existing_id: ClassId,
    pub existing_name: String,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_names_are_normalized() {
        let entry = LabelEntry::new(" Cat ").with_aliases(["Kitty", "feline "]);
        let names: Vec<String> = entry.all_names().collect();
        assert_eq!(names, vec!["cat", "kitty", "feline"]);
    }
}
