use super::require_text;
use crate::core::{Result, SyncError};
use crate::mapping::{Convert, Field, FieldMap};
use crate::store::SingletonDomain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionPoint {
    #[serde(default)]
    pub id: String,
    pub text: String,
}

/// One earnings tier of the "potensi penghasilan" panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRange {
    #[serde(default)]
    pub id: String,
    pub label: String,
    pub amount: String,
    /// Width of the tier's progress bar, 0 to 100.
    pub percentage: i64,
}

/// Commission section content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionContent {
    pub commission_title: String,
    pub commission_subtitle: String,
    pub commission_points: Vec<CommissionPoint>,
    pub earnings_title: String,
    pub earnings_subtitle: String,
    pub earnings_ranges: Vec<EarningsRange>,
}

static FIELDS: [Field; 6] = [
    Field::new("komisi_title", "commission_title", Convert::Text("")),
    Field::new("komisi_subtitle", "commission_subtitle", Convert::Text("")),
    Field::new("komisi_points", "commission_points", Convert::List),
    Field::new("potensi_title", "earnings_title", Convert::Text("")),
    Field::new("potensi_subtitle", "earnings_subtitle", Convert::Text("")),
    Field::new("potensi_ranges", "earnings_ranges", Convert::List),
];

/// `komisi_magang` table.
pub struct Commission;

impl SingletonDomain for Commission {
    type Record = CommissionContent;

    const TABLE: &'static str = "komisi_magang";

    fn fields() -> FieldMap {
        FieldMap::new(&FIELDS)
    }

    fn defaults() -> CommissionContent {
        let point = |id: &str, text: &str| CommissionPoint {
            id: id.to_string(),
            text: text.to_string(),
        };
        let range = |id: &str, label: &str, amount: &str, percentage| EarningsRange {
            id: id.to_string(),
            label: label.to_string(),
            amount: amount.to_string(),
            percentage,
        };
        CommissionContent {
            commission_title: "Komisi Per Penutupan".to_string(),
            commission_subtitle: "Transparan & Langsung Dibayar".to_string(),
            commission_points: vec![
                point("1", "Komisi 10-20% dari setiap transaksi berhasil"),
                point("2", "Tidak ada batas maksimal penghasilan"),
                point("3", "Komisi dibayarkan per minggu"),
                point("4", "Bonus tambahan untuk top performer"),
            ],
            earnings_title: "Potensi Penghasilan".to_string(),
            earnings_subtitle: "Semakin Rajin, Semakin Besar".to_string(),
            earnings_ranges: vec![
                range("1", "Pemula (penutupan 1-5 bulan/bulan)", "Rp 500rb - 1jt", 40),
                range("2", "Menengah (6-15 tutup/bulan)", "Rp 1jt - 3jt", 65),
                range("3", "Ahli (16+ penutupan/bulan)", "Rp 3jt++", 90),
            ],
        }
    }

    /// Earnings tiers are shown from the smallest bar up.
    fn prepare(mut record: CommissionContent) -> CommissionContent {
        record.earnings_ranges.sort_by_key(|range| range.percentage);
        record
    }

    fn validate(record: &CommissionContent) -> Result<()> {
        require_text("commission title", &record.commission_title)?;
        require_text("earnings title", &record.earnings_title)?;
        for point in &record.commission_points {
            require_text("commission point", &point.text)?;
        }
        for range in &record.earnings_ranges {
            require_text("earnings range label", &range.label)?;
            if !(0..=100).contains(&range.percentage) {
                return Err(SyncError::validation(format!(
                    "percentage of '{}' must be between 0 and 100, got {}",
                    range.label, range.percentage
                )));
            }
        }
        Ok(())
    }
}
