//! Species/format catalog seam and a CSV-backed implementation.

use crate::models::{FormatRules, Item};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

/// Pure lookup service for legal items, evolution lines and usability.
pub trait Catalog: Send + Sync {
    fn legal_pool(&self, rules: &FormatRules) -> BTreeSet<Item>;

    /// The line `item` belongs to, from its earliest stage to its final stage.
    fn evolution_line(&self, item: &str) -> Vec<Item>;

    fn is_usable(&self, item: &str, rules: &FormatRules) -> bool;

    /// Every forme a player may bring in place of `item`, `item` included.
    fn formes(&self, item: &str) -> Vec<Item> {
        vec![item.to_string()]
    }

    /// Species identity used for the species clause.
    fn species(&self, item: &str) -> String {
        item.to_string()
    }
}

/// Items one evolution step away from `item`: forward when `direction > 0`, backward otherwise.
pub fn evolution_targets(catalog: &dyn Catalog, item: &str, direction: i32) -> Vec<Item> {
    let line = catalog.evolution_line(item);
    let base = catalog.species(item);
    let Some(pos) = line.iter().position(|i| *i == base) else {
        return Vec::new();
    };
    let target = if direction > 0 {
        line.get(pos + 1)
    } else if pos > 0 {
        line.get(pos - 1)
    } else {
        None
    };
    target.map(|t| catalog.formes(t)).unwrap_or_default()
}

#[derive(Clone, Debug, Deserialize)]
struct CatalogRecord {
    name: String,
    #[serde(default)]
    species: Option<String>,
    #[serde(default)]
    prevo: Option<String>,
    #[serde(default = "default_usable")]
    usable: bool,
}

fn default_usable() -> bool {
    true
}

#[derive(Clone, Debug)]
struct Entry {
    species: String,
    prevo: Option<String>,
    usable: bool,
}

/// Catalog loaded from CSV with columns `name,species,prevo,usable`.
/// Rows sharing a species are formes; the row whose name equals the species is the base forme.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<Item, Entry>,
    /// Insertion order, so evolution branches resolve to the first listed child.
    order: Vec<Item>,
}

impl StaticCatalog {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut catalog = Self::default();
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        for record in rdr.deserialize() {
            let record: CatalogRecord = record?;
            catalog.insert(record);
        }
        log::debug!("Loaded catalog with {} entries", catalog.entries.len());
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// A catalog of independent, usable items with no evolutions or formes.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        for name in names {
            catalog.insert(CatalogRecord {
                name: name.into(),
                species: None,
                prevo: None,
                usable: true,
            });
        }
        catalog
    }

    fn insert(&mut self, record: CatalogRecord) {
        let species = record
            .species
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| record.name.clone());
        let prevo = record.prevo.filter(|p| !p.is_empty());
        if !self.entries.contains_key(&record.name) {
            self.order.push(record.name.clone());
        }
        self.entries.insert(
            record.name,
            Entry {
                species,
                prevo,
                usable: record.usable,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_base_forme(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.species == name)
    }

    fn first_child(&self, name: &str) -> Option<&Item> {
        self.order.iter().find(|candidate| {
            self.is_base_forme(candidate)
                && self.entries[candidate.as_str()].prevo.as_deref() == Some(name)
        })
    }
}

impl Catalog for StaticCatalog {
    fn legal_pool(&self, rules: &FormatRules) -> BTreeSet<Item> {
        self.order
            .iter()
            .filter(|name| self.is_base_forme(name) && self.is_usable(name, rules))
            .cloned()
            .collect()
    }

    fn evolution_line(&self, item: &str) -> Vec<Item> {
        let base = self.species(item);
        if !self.entries.contains_key(&base) {
            return Vec::new();
        }
        let mut line = vec![base.clone()];
        let mut current = base.clone();
        while let Some(prevo) = self.entries.get(&current).and_then(|e| e.prevo.clone()) {
            // Cycles in hand-written data would loop forever.
            if line.contains(&prevo) {
                break;
            }
            line.insert(0, prevo.clone());
            current = prevo;
        }
        let mut current = base;
        while let Some(child) = self.first_child(&current).cloned() {
            if line.contains(&child) {
                break;
            }
            line.push(child.clone());
            current = child;
        }
        line
    }

    fn is_usable(&self, item: &str, rules: &FormatRules) -> bool {
        self.entries
            .get(item)
            .is_some_and(|e| e.usable && !rules.is_banned(item) && !rules.is_banned(&e.species))
    }

    fn formes(&self, item: &str) -> Vec<Item> {
        if !self.is_base_forme(item) {
            return vec![item.to_string()];
        }
        self.order
            .iter()
            .filter(|name| self.entries[name.as_str()].species == item)
            .cloned()
            .collect()
    }

    fn species(&self, item: &str) -> String {
        self.entries
            .get(item)
            .map(|e| e.species.clone())
            .unwrap_or_else(|| item.to_string())
    }
}
