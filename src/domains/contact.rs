use super::require_text;
use crate::core::{Result, SyncError};
use crate::mapping::{Convert, Field, FieldMap};
use crate::store::SingletonDomain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone_display: String,
    pub email: String,
    pub instagram: String,
    pub instagram_url: String,
    pub whatsapp_url: String,
}

static FIELDS: [Field; 5] = [
    Field::same("phone_display", Convert::Text("")),
    Field::same("email", Convert::Text("")),
    Field::same("instagram", Convert::Text("")),
    Field::same("instagram_url", Convert::Text("")),
    Field::same("whatsapp_url", Convert::Text("")),
];

/// Chat link for a displayed phone number: `https://wa.me/` plus its digits.
pub fn whatsapp_url(phone_display: &str) -> String {
    let digits: String = phone_display.chars().filter(char::is_ascii_digit).collect();
    format!("https://wa.me/{digits}")
}

fn check_email(email: &str) -> Result<()> {
    let valid = match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    };
    if !valid {
        return Err(SyncError::validation(format!("'{email}' is not an email address")));
    }
    Ok(())
}

/// `contact_info` table.
pub struct Contact;

impl SingletonDomain for Contact {
    type Record = ContactInfo;

    const TABLE: &'static str = "contact_info";

    fn fields() -> FieldMap {
        FieldMap::new(&FIELDS)
    }

    fn defaults() -> ContactInfo {
        ContactInfo {
            phone_display: "+62 812-3456-7890".to_string(),
            email: "info@digimagang.id".to_string(),
            instagram: "@digimagang.id".to_string(),
            instagram_url: "https://instagram.com/digimagang.id".to_string(),
            whatsapp_url: "https://wa.me/6281234567890".to_string(),
        }
    }

    /// The WhatsApp link always follows the phone number.
    fn prepare(mut record: ContactInfo) -> ContactInfo {
        record.whatsapp_url = whatsapp_url(&record.phone_display);
        record
    }

    fn validate(record: &ContactInfo) -> Result<()> {
        require_text("phone number", &record.phone_display)?;
        if !record.phone_display.chars().any(|c| c.is_ascii_digit()) {
            return Err(SyncError::validation("phone number has no digits"));
        }
        check_email(&record.email)
    }
}
