use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::component::{Category, Component};
use crate::iupac_code::validate_sequence;

const BUILTIN_COMPONENTS_CSV: &str = include_str!("../assets/components.csv");

/// Read access to a set of known components. The annotation engine takes this
/// as an injected dependency and reads one snapshot per run.
pub trait ComponentStore: Send + Sync {
    /// All components, optionally restricted to one category.
    fn list_components(&self, category: Option<Category>) -> Result<Vec<Component>>;

    /// Point lookup; `Ok(None)` for an unknown id.
    fn get_component(&self, id: i64) -> Result<Option<Component>>;
}

/// In-memory component store, seeded from the embedded catalog.
#[derive(Debug, Clone)]
pub struct ComponentDatabase {
    components: Vec<Component>,
    next_id: i64,
}

/// One row of the seed catalog.
#[derive(Debug, Deserialize)]
struct SeedRow {
    name: String,
    category: String,
    sequence: String,
    description: Option<String>,
    organism: Option<String>,
    is_builtin: Option<bool>,
}

impl ComponentDatabase {
    pub fn empty() -> Self {
        Self {
            components: vec![],
            next_id: 1,
        }
    }

    /// Parse a component catalog from CSV text with columns
    /// `name,category,sequence,description,organism,is_builtin`.
    /// Sequence length is derived, never trusted from the file.
    pub fn from_csv_text(text: &str) -> Result<Self> {
        let mut db = Self::empty();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        for row in reader.deserialize() {
            let row: SeedRow = row.map_err(|e| anyhow!("Bad component row: {e}"))?;
            if row.name.is_empty() || row.sequence.is_empty() {
                continue;
            }
            let sequence = row.sequence.to_uppercase();
            if let Err((pos, letter)) = validate_sequence(sequence.as_bytes()) {
                return Err(anyhow!(
                    "Component '{}' has invalid letter '{}' at position {pos}",
                    row.name,
                    letter as char
                ));
            }
            let id = db.next_id;
            db.next_id += 1;
            let length = sequence.len();
            db.components.push(Component {
                id,
                name: row.name,
                category: Category::from_label(&row.category),
                sequence,
                length,
                description: row.description.filter(|d| !d.is_empty()),
                organism: row.organism.filter(|o| !o.is_empty()),
                is_builtin: row.is_builtin.unwrap_or(true),
            });
        }
        Ok(db)
    }

    /// Insert a user component. The sequence is validated and uppercased via
    /// `Component::new`; the store assigns the id. Returns the new id.
    pub fn insert_component(&mut self, component: Component) -> Result<i64> {
        let mut component = Component::new(component.name, component.category, component.sequence)
            .map(|c| Component {
                description: component.description,
                organism: component.organism,
                ..c
            })?;
        component.id = self.next_id;
        self.next_id += 1;
        let id = component.id;
        self.components.push(component);
        Ok(id)
    }

    /// Remove a user component. Builtins are protected.
    /// Returns whether a component was removed.
    pub fn remove_component(&mut self, id: i64) -> bool {
        let before = self.components.len();
        self.components.retain(|c| c.id != id || c.is_builtin);
        self.components.len() != before
    }

    /// Case-insensitive substring search over component names.
    pub fn search_components(&self, query: &str) -> Vec<Component> {
        let query = query.to_lowercase();
        self.components
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for ComponentDatabase {
    fn default() -> Self {
        // The builtin catalog is embedded at compile time; a parse failure
        // is a packaging bug, not a runtime condition.
        Self::from_csv_text(BUILTIN_COMPONENTS_CSV).unwrap()
    }
}

impl ComponentStore for ComponentDatabase {
    fn list_components(&self, category: Option<Category>) -> Result<Vec<Component>> {
        Ok(self
            .components
            .iter()
            .filter(|c| category.is_none_or(|cat| c.category == cat))
            .cloned()
            .collect())
    }

    fn get_component(&self, id: i64) -> Result<Option<Component>> {
        Ok(self.components.iter().find(|c| c.id == id).cloned())
    }
}
