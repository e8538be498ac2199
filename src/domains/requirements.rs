use super::require_text;
use crate::core::{Result, SyncError};
use crate::gateway::OrderSpec;
use crate::mapping::{Convert, Field, FieldMap};
use crate::store::{SingletonDomain, SingletonStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One eligibility requirement line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub order: i64,
}

/// Requirement list, stored whole in the `items` column of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementList {
    pub items: Vec<Requirement>,
}

impl RequirementList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Requirement> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Next free numeric id and order, one past the current maxima.
    fn next_slot(&self) -> (String, i64) {
        let id = self
            .items
            .iter()
            .filter_map(|item| item.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let order = self.items.iter().map(|item| item.order).max().unwrap_or(0) + 1;
        (id.to_string(), order)
    }
}

static FIELDS: [Field; 1] = [Field::same("items", Convert::List)];

const DEFAULTS: [&str; 5] = [
    "Tidak perlu pengalaman sebelumnya",
    "Punya laptop/HP dan internet",
    "Bisa komitmen minimal 3 bulan",
    "Niat belajar & konsisten",
    "Siap praktik dan target-oriented",
];

/// `requirements` table. The newest row holds the whole list.
pub struct Requirements;

impl SingletonDomain for Requirements {
    type Record = RequirementList;

    const TABLE: &'static str = "requirements";

    fn fields() -> FieldMap {
        FieldMap::new(&FIELDS)
    }

    fn defaults() -> RequirementList {
        let items = DEFAULTS
            .iter()
            .zip(1..)
            .map(|(text, order)| Requirement {
                id: order.to_string(),
                text: text.to_string(),
                order,
            })
            .collect();
        RequirementList { items }
    }

    /// Items are shown by ascending `order`.
    fn prepare(mut record: RequirementList) -> RequirementList {
        record.items.sort_by_key(|item| item.order);
        record
    }

    fn validate(record: &RequirementList) -> Result<()> {
        let mut seen = HashSet::new();
        for item in &record.items {
            require_text("requirement id", &item.id)?;
            require_text("requirement text", &item.text)?;
            if !seen.insert(item.id.as_str()) {
                return Err(SyncError::validation(format!(
                    "duplicate requirement id '{}'",
                    item.id
                )));
            }
        }
        Ok(())
    }

    fn is_blank(record: &RequirementList) -> bool {
        record.items.is_empty()
    }

    fn row_order() -> Option<OrderSpec> {
        Some(OrderSpec::descending("id"))
    }
}

/// Per-line edits. Each one saves the whole list.
impl SingletonStore<Requirements> {
    /// Replaces the list.
    pub async fn save_items(&self, items: Vec<Requirement>) -> Result<RequirementList> {
        self.update(RequirementList { items }).await
    }

    /// Appends a line after the last one.
    pub async fn add_item(&self, text: &str) -> Result<Requirement> {
        let mut list = self.record();
        let (id, order) = list.next_slot();
        let item = Requirement {
            id,
            text: text.trim().to_string(),
            order,
        };
        list.items.push(item.clone());
        self.update(list).await?;
        Ok(item)
    }

    pub async fn edit_item(&self, id: &str, text: &str) -> Result<Requirement> {
        let mut list = self.record();
        let item = list
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| SyncError::not_found(format!("requirement '{id}'")))?;
        item.text = text.trim().to_string();
        let edited = item.clone();
        self.update(list).await?;
        Ok(edited)
    }

    pub async fn remove_item(&self, id: &str) -> Result<()> {
        let mut list = self.record();
        let before = list.items.len();
        list.items.retain(|item| item.id != id);
        if list.items.len() == before {
            return Err(SyncError::not_found(format!("requirement '{id}'")));
        }
        self.update(list).await?;
        Ok(())
    }
}
