use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, LibraryError};
use crate::identity::generate_id;
use crate::models::{tables, Category, Publication};
use crate::store::{or_empty, RecordStore};
use crate::validation::{Validator, MAX_NAME_LEN, MAX_TEXT_LEN};

/// Categories created on first start.
const DEFAULT_CATEGORIES: [(&str, &str); 3] = [
    ("Literature", "Fiction, poetry and drama"),
    ("Science & Technology", "Natural sciences, engineering and computing"),
    ("History", "History and biography"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub category_name: String,
    #[serde(default)]
    pub parent_category_id: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub category_name: Option<String>,
    pub description: Option<String>,
}

/// A category with its subcategories nested below it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Ids of every category below `category_id`, depth first. Parent cycles in
/// stored data are cut at the first repeat.
pub fn descendant_ids(categories: &[Category], category_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    seen.insert(category_id.to_string());
    let mut out = Vec::new();
    collect_descendants(categories, category_id, &mut seen, &mut out);
    out
}

fn collect_descendants(
    categories: &[Category],
    parent_id: &str,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    for child in categories
        .iter()
        .filter(|c| c.parent_category_id.as_deref() == Some(parent_id))
    {
        if seen.insert(child.category_id.clone()) {
            out.push(child.category_id.clone());
            collect_descendants(categories, &child.category_id, seen, out);
        }
    }
}

pub struct CategoryCatalog {
    store: Arc<RecordStore>,
}

impl CategoryCatalog {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Create the default top-level categories if the table is empty.
    /// Returns how many were created.
    pub fn seed_defaults(&self) -> Result<usize, LibraryError> {
        let mut uow = self.store.begin();
        if !uow.all::<Category>()?.is_empty() {
            return Ok(0);
        }
        for (name, description) in DEFAULT_CATEGORIES {
            uow.insert(Category {
                category_id: generate_id("cat"),
                category_name: name.to_string(),
                parent_category_id: None,
                description: description.to_string(),
            })?;
        }
        uow.commit()?;

        tracing::info!("Seeded {} default categories", DEFAULT_CATEGORIES.len());
        Ok(DEFAULT_CATEGORIES.len())
    }

    pub fn create(&self, input: NewCategory) -> Result<Category, LibraryError> {
        Validator::validate_text("categoryName", &input.category_name, MAX_NAME_LEN)?;
        Validator::validate_optional_text("description", &input.description, MAX_TEXT_LEN)?;

        let mut uow = self.store.begin();
        let parent_category_id = input.parent_category_id.filter(|p| !p.is_empty());
        if let Some(parent_id) = &parent_category_id {
            if uow.get::<Category>(parent_id)?.is_none() {
                return Err(LibraryError::not_found(EntityKind::Category, parent_id));
            }
        }

        let category = Category {
            category_id: generate_id("cat"),
            category_name: input.category_name,
            parent_category_id,
            description: input.description,
        };
        uow.insert(category.clone())?;
        uow.commit()?;
        Ok(category)
    }

    pub fn get(&self, category_id: &str) -> Option<Category> {
        or_empty(self.store.get(category_id), tables::CATEGORIES)
    }

    pub fn all(&self) -> Vec<Category> {
        or_empty(self.store.all(), tables::CATEGORIES)
    }

    pub fn update(
        &self,
        category_id: &str,
        update: CategoryUpdate,
    ) -> Result<Category, LibraryError> {
        if let Some(name) = &update.category_name {
            Validator::validate_text("categoryName", name, MAX_NAME_LEN)?;
        }
        if let Some(description) = &update.description {
            Validator::validate_optional_text("description", description, MAX_TEXT_LEN)?;
        }

        self.store
            .update::<Category>(category_id, |c| {
                if let Some(name) = update.category_name {
                    c.category_name = name;
                }
                if let Some(description) = update.description {
                    c.description = description;
                }
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Category, category_id))
    }

    /// Delete a leaf category. Publications filed under it lose their
    /// category.
    pub fn delete(&self, category_id: &str) -> Result<(), LibraryError> {
        let mut uow = self.store.begin();
        let children = uow
            .query::<Category>(|c| c.parent_category_id.as_deref() == Some(category_id))?
            .len();
        if children > 0 {
            return Err(LibraryError::InvalidState(format!(
                "category {} has {} subcategories",
                category_id, children
            )));
        }
        if !uow.delete::<Category>(category_id)? {
            return Err(LibraryError::not_found(EntityKind::Category, category_id));
        }
        let unfiled = uow.update_where::<Publication>(
            |p| p.category_id.as_deref() == Some(category_id),
            |p| p.category_id = None,
        )?;
        uow.commit()?;

        if unfiled > 0 {
            tracing::debug!("Unfiled {} publications from category {}", unfiled, category_id);
        }
        Ok(())
    }

    pub fn children(&self, parent_id: &str) -> Vec<Category> {
        or_empty(
            self.store
                .query::<Category>(|c| c.parent_category_id.as_deref() == Some(parent_id)),
            tables::CATEGORIES,
        )
    }

    pub fn roots(&self) -> Vec<Category> {
        or_empty(
            self.store.query::<Category>(|c| c.parent_category_id.is_none()),
            tables::CATEGORIES,
        )
    }

    /// Every root category with its subtree. Categories whose parent is
    /// missing are left out.
    pub fn tree(&self) -> Vec<CategoryNode> {
        let categories = self.all();
        let mut on_path = HashSet::new();
        categories
            .iter()
            .filter(|c| c.parent_category_id.is_none())
            .map(|root| build_node(&categories, root, &mut on_path))
            .collect()
    }

    /// Categories from the root down to `category_id`, inclusive. Empty if it
    /// does not exist.
    pub fn path(&self, category_id: &str) -> Vec<Category> {
        let categories = self.all();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(category_id.to_string());

        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                tracing::warn!("Category cycle detected at {}", id);
                break;
            }
            let Some(category) = categories.iter().find(|c| c.category_id == id) else {
                break;
            };
            current = category.parent_category_id.clone();
            path.push(category.clone());
        }

        path.reverse();
        path
    }

    pub fn descendant_ids(&self, category_id: &str) -> Vec<String> {
        descendant_ids(&self.all(), category_id)
    }
}

fn build_node(
    categories: &[Category],
    category: &Category,
    on_path: &mut HashSet<String>,
) -> CategoryNode {
    on_path.insert(category.category_id.clone());
    let mut children = Vec::new();
    for child in categories
        .iter()
        .filter(|c| c.parent_category_id.as_deref() == Some(category.category_id.as_str()))
    {
        // Skip anything already above us; a corrupt parent chain must not recurse forever.
        if !on_path.contains(&child.category_id) {
            children.push(build_node(categories, child, on_path));
        }
    }
    on_path.remove(&category.category_id);

    CategoryNode {
        category: category.clone(),
        children,
    }
}
