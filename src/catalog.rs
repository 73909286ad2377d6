//! Material catalog seam. Read-only from the workflow's point of view.
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
}

impl Material {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: None,
        }
    }
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait MaterialCatalog: Send + Sync {
    /// All materials ordered by category, then name.
    fn list_materials(&self) -> Vec<Material>;
    fn get_material(&self, id: &str) -> Option<Material>;
}

#[derive(Default)]
pub struct InMemoryCatalog {
    materials: RwLock<Vec<Material>>,
}

impl InMemoryCatalog {
    pub fn new(materials: Vec<Material>) -> Self {
        let catalog = Self::default();
        for material in materials {
            catalog.add(material);
        }
        catalog
    }

    pub fn add(&self, material: Material) {
        let mut materials = self
            .materials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        materials.retain(|m| m.id != material.id);
        materials.push(material);
        materials.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
    }
}

impl MaterialCatalog for InMemoryCatalog {
    fn list_materials(&self) -> Vec<Material> {
        self.materials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn get_material(&self, id: &str) -> Option<Material> {
        self.materials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }
}

pub fn grouped_by_category(catalog: &dyn MaterialCatalog) -> BTreeMap<String, Vec<Material>> {
    let mut groups: BTreeMap<String, Vec<Material>> = BTreeMap::new();
    for material in catalog.list_materials() {
        groups
            .entry(material.category.clone())
            .or_default()
            .push(material);
    }
    groups
}
