use super::{require_optional_text, require_text};
use crate::core::{Result, SyncError};
use crate::gateway::OrderSpec;
use crate::mapping::{Convert, Field, FieldMap};
use crate::store::{Domain, Entity, Placement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    Active,
    Inactive,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub status: ProgramStatus,
    pub participants: i64,
    pub start_date: String,
    pub end_date: String,
    pub price: String,
    pub duration: String,
    pub icon: String,
}

impl Program {
    pub fn is_active(&self) -> bool {
        self.status == ProgramStatus::Active
    }
}

impl Entity for Program {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDraft {
    pub name: String,
    pub description: String,
    pub category: String,
    pub status: ProgramStatus,
    pub participants: i64,
    pub start_date: String,
    pub end_date: String,
    pub price: String,
    pub duration: String,
    pub icon: String,
}

impl ProgramDraft {
    /// Draft with the catalogue defaults for price, duration and icon.
    pub fn new(name: &str, category: &str, status: ProgramStatus) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            status,
            participants: 0,
            start_date: String::new(),
            end_date: String::new(),
            price: "Gratis".to_string(),
            duration: "3 Bulan".to_string(),
            icon: "📚".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgramPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgramStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

static FIELDS: [Field; 11] = [
    Field::same("id", Convert::Id),
    Field::same("name", Convert::Text("")),
    Field::same("description", Convert::Text("")),
    Field::same("category", Convert::Text("")),
    Field::same("status", Convert::Text("draft")),
    Field::same("participants", Convert::Integer(0)),
    Field::same("start_date", Convert::Text("")),
    Field::same("end_date", Convert::Text("")),
    Field::same("price", Convert::Text("Gratis")),
    Field::same("duration", Convert::Text("3 Bulan")),
    Field::same("icon", Convert::Text("📚")),
];

fn check_participants(participants: i64) -> Result<()> {
    if participants < 0 {
        return Err(SyncError::validation("participants must not be negative"));
    }
    Ok(())
}

/// `programs` table, newest first.
pub struct Programs;

impl Domain for Programs {
    type Entity = Program;
    type Draft = ProgramDraft;
    type Patch = ProgramPatch;

    const TABLE: &'static str = "programs";

    fn fields() -> FieldMap {
        FieldMap::new(&FIELDS)
    }

    fn defaults() -> Vec<Program> {
        let program = |id: &str, name: &str, description: &str, category: &str, icon: &str| Program {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            status: ProgramStatus::Active,
            participants: 0,
            start_date: String::new(),
            end_date: String::new(),
            price: "Gratis".to_string(),
            duration: "3 Bulan".to_string(),
            icon: icon.to_string(),
        };
        vec![
            program(
                "default-1",
                "Digital Marketing Fundamental",
                "Dasar-dasar digital marketing, strategi, dan ekosistem online.",
                "Digital Marketing",
                "📚",
            ),
            program(
                "default-2",
                "Content Marketing",
                "Instagram, TikTok, Reels - buat konten yang viral dan convert.",
                "Konten",
                "📱",
            ),
            program(
                "default-3",
                "Copywriting & Closing",
                "Teknik menulis yang menjual dan skill closing yang efektif.",
                "Sales",
                "✍️",
            ),
        ]
    }

    fn fetch_order() -> Option<OrderSpec> {
        Some(OrderSpec::descending("created_at"))
    }

    fn placement() -> Placement<Program> {
        Placement::Prepend
    }

    fn validate_draft(draft: &ProgramDraft) -> Result<()> {
        require_text("program name", &draft.name)?;
        check_participants(draft.participants)
    }

    fn validate_patch(patch: &ProgramPatch) -> Result<()> {
        require_optional_text("program name", patch.name.as_ref())?;
        patch.participants.map_or(Ok(()), check_participants)
    }
}

/// Programs open for registration.
pub fn active(program: &Program) -> bool {
    program.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_defaults_fill_missing_catalogue_fields() {
        let row = json!({
            "id": 7,
            "name": "Ads Dasar",
            "description": "Meta & TikTok Ads",
            "category": "Ads",
            "status": "active",
            "participants": null,
            "start_date": "2025-01-01",
            "end_date": "2025-04-01",
            "price": null
        });
        let program: Program = Programs::fields()
            .decode(row.as_object().unwrap())
            .unwrap();

        assert_eq!(program.id, "7");
        assert_eq!(program.participants, 0);
        assert_eq!(program.price, "Gratis");
        assert_eq!(program.duration, "3 Bulan");
        assert_eq!(program.icon, "📚");
        assert!(program.is_active());
    }

    #[test]
    fn test_draft_validation() {
        let mut draft = ProgramDraft::new("  ", "Ads", ProgramStatus::Draft);
        assert!(matches!(
            Programs::validate_draft(&draft),
            Err(SyncError::Validation(_))
        ));

        draft.name = "Siswa SMK".to_string();
        draft.participants = -1;
        assert!(Programs::validate_draft(&draft).is_err());

        draft.participants = 12;
        assert!(Programs::validate_draft(&draft).is_ok());
    }

    #[test]
    fn test_patch_encodes_only_set_columns() {
        let patch = ProgramPatch {
            status: Some(ProgramStatus::Inactive),
            ..Default::default()
        };
        let row = Programs::fields().encode(&patch).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row["status"], json!("inactive"));
    }

    #[test]
    fn test_defaults_are_active_with_unique_ids() {
        let defaults = Programs::defaults();
        assert_eq!(defaults.len(), 3);
        assert!(defaults.iter().all(active));
        let mut ids: Vec<&str> = defaults.iter().map(|p| p.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
