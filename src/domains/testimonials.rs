use super::{require_optional_text, require_text};
use crate::core::{Result, SyncError};
use crate::gateway::OrderSpec;
use crate::mapping::{Convert, Field, FieldMap};
use crate::store::{Domain, Entity, Placement};
use serde::{Deserialize, Serialize};

/// Mirror cache entry holding the last known testimonial list.
pub const TESTIMONIAL_MIRROR_KEY: &str = "testimoni_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestimonialStatus {
    Published,
    Draft,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: String,
    pub author: String,
    pub program: String,
    pub content: String,
    pub rating: i64,
    pub status: TestimonialStatus,
    /// Publication date; rows without one use their creation time.
    pub date: String,
    pub image: Option<String>,
    pub avatar: Option<String>,
    pub earnings: Option<String>,
}

impl Testimonial {
    pub fn is_published(&self) -> bool {
        self.status == TestimonialStatus::Published
    }
}

impl Entity for Testimonial {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonialDraft {
    pub author: String,
    pub program: String,
    pub content: String,
    pub rating: i64,
    pub status: TestimonialStatus,
    pub date: String,
    pub image: Option<String>,
    pub avatar: Option<String>,
    pub earnings: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestimonialPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TestimonialStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earnings: Option<String>,
}

static FIELDS: [Field; 10] = [
    Field::same("id", Convert::Id),
    Field::same("author", Convert::Text("")),
    Field::same("program", Convert::Text("")),
    Field::same("content", Convert::Text("")),
    Field::same("rating", Convert::Integer(5)),
    Field::same("status", Convert::Text("draft")),
    Field::same("date", Convert::Text("")).or_column("created_at"),
    Field::same("image", Convert::OptionalText),
    Field::same("avatar", Convert::OptionalText),
    Field::same("earnings", Convert::OptionalText),
];

fn check_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(SyncError::validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

fn newest_first(a: &Testimonial, b: &Testimonial) -> std::cmp::Ordering {
    b.date.cmp(&a.date)
}

/// `testimoni` table, newest date first.
pub struct Testimonials;

impl Domain for Testimonials {
    type Entity = Testimonial;
    type Draft = TestimonialDraft;
    type Patch = TestimonialPatch;

    const TABLE: &'static str = "testimoni";
    const TOUCH_COLUMN: Option<&'static str> = None;

    fn fields() -> FieldMap {
        FieldMap::new(&FIELDS)
    }

    fn defaults() -> Vec<Testimonial> {
        let testimonial = |id: &str, author: &str, program: &str, content: &str, date: &str, earnings: &str| {
            Testimonial {
                id: id.to_string(),
                author: author.to_string(),
                program: program.to_string(),
                content: content.to_string(),
                rating: 5,
                status: TestimonialStatus::Published,
                date: date.to_string(),
                image: None,
                avatar: None,
                earnings: Some(earnings.to_string()),
            }
        };
        vec![
            testimonial(
                "default-1",
                "Rina Safitri",
                "Content Marketing",
                "Awalnya cuma iseng ikut magang, sekarang sudah bisa closing sendiri dari konten Instagram.",
                "2025-03-01",
                "Rp 2,5jt/bulan",
            ),
            testimonial(
                "default-2",
                "Dimas Prasetyo",
                "Copywriting & Closing",
                "Mentornya sabar dan materinya langsung dipraktikkan ke project nyata.",
                "2025-02-15",
                "Rp 1,2jt/bulan",
            ),
            testimonial(
                "default-3",
                "Salsa Nabila",
                "WhatsApp Marketing",
                "Jam kerjanya fleksibel, cocok buat PKL sambil sekolah.",
                "2025-02-01",
                "Rp 800rb/bulan",
            ),
        ]
    }

    fn fetch_order() -> Option<OrderSpec> {
        Some(OrderSpec::descending("date"))
    }

    fn placement() -> Placement<Testimonial> {
        Placement::SortedBy(newest_first)
    }

    fn validate_draft(draft: &TestimonialDraft) -> Result<()> {
        require_text("author", &draft.author)?;
        require_text("content", &draft.content)?;
        check_rating(draft.rating)
    }

    fn validate_patch(patch: &TestimonialPatch) -> Result<()> {
        require_optional_text("author", patch.author.as_ref())?;
        require_optional_text("content", patch.content.as_ref())?;
        patch.rating.map_or(Ok(()), check_rating)
    }
}

/// Testimonials shown on the landing page.
pub fn published(testimonial: &Testimonial) -> bool {
    testimonial.is_published()
}
