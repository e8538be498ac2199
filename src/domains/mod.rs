//! Landing page domains
//!
//! Each domain binds a table to its entity types, field table, fallback
//! defaults, presentation order and pre-submit checks. The stores in
//! [`crate::store`] do the rest.

pub mod commission;
pub mod contact;
pub mod programs;
pub mod requirements;
pub mod testimonials;

pub use commission::{Commission, CommissionContent, CommissionPoint, EarningsRange};
pub use contact::{Contact, ContactInfo};
pub use programs::{Program, ProgramDraft, ProgramPatch, ProgramStatus, Programs};
pub use requirements::{Requirement, RequirementList, Requirements};
pub use testimonials::{
    TESTIMONIAL_MIRROR_KEY, Testimonial, TestimonialDraft, TestimonialPatch, TestimonialStatus,
    Testimonials,
};

use crate::core::{Result, SyncError};
use crate::store::{DomainStore, SingletonStore};

pub type ProgramStore = DomainStore<Programs>;
pub type TestimonialStore = DomainStore<Testimonials>;
pub type CommissionStore = SingletonStore<Commission>;
pub type ContactStore = SingletonStore<Contact>;
pub type RequirementStore = SingletonStore<Requirements>;

pub(crate) fn require_text(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{label} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_optional_text(label: &str, value: Option<&String>) -> Result<()> {
    match value {
        Some(value) => require_text(label, value),
        None => Ok(()),
    }
}
