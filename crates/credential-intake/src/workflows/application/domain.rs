use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::PackageSelection;

/// The in-progress application held by the client until finalization.
///
/// Serialized as one flat camelCase object; each field is a section that is replaced
/// wholesale by the wizard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftApplication {
    pub personal_info: PersonalInfo,
    pub education: EducationHistory,
    pub documents: DocumentSet,
    pub selected_package: PackageSelection,
    pub review_data: ReviewConsent,
}

impl DraftApplication {
    /// Replace the section named by `data`; the other sections are untouched.
    pub fn replace_section(&mut self, data: SectionData) {
        match data {
            SectionData::PersonalInfo(section) => self.personal_info = section,
            SectionData::Education(section) => self.education = section,
            SectionData::Documents(section) => self.documents = section,
            SectionData::SelectedPackage(section) => self.selected_package = section,
            SectionData::ReviewData(section) => self.review_data = section,
        }
    }

    pub fn applicant_name(&self) -> String {
        format!(
            "{} {}",
            self.personal_info.first_name.trim(),
            self.personal_info.last_name.trim()
        )
        .trim()
        .to_string()
    }
}

/// Identity section. The email entered here is the one that must be verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub address: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub zip_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationHistory {
    pub education_history: Vec<EducationEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationEntry {
    pub institution: String,
    pub country: String,
    pub degree_type: String,
    pub field_of_study: String,
    pub start_year: String,
    pub end_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentSet {
    pub files: Vec<DocumentReference>,
}

/// Pointer to an uploaded document. Order in [`DocumentSet::files`] is display order only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub id: String,
    pub name: String,
    #[serde(alias = "path")]
    pub locator: String,
    #[serde(rename = "type", default)]
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewConsent {
    pub terms_accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

/// Names of the draft sections, in wizard order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKey {
    PersonalInfo,
    Education,
    Documents,
    SelectedPackage,
    ReviewData,
}

impl SectionKey {
    pub const fn label(self) -> &'static str {
        match self {
            SectionKey::PersonalInfo => "personalInfo",
            SectionKey::Education => "education",
            SectionKey::Documents => "documents",
            SectionKey::SelectedPackage => "selectedPackage",
            SectionKey::ReviewData => "reviewData",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Replacement payload for one section; the variant names the section it replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    PersonalInfo(PersonalInfo),
    Education(EducationHistory),
    Documents(DocumentSet),
    SelectedPackage(PackageSelection),
    ReviewData(ReviewConsent),
}

impl SectionData {
    pub const fn key(&self) -> SectionKey {
        match self {
            SectionData::PersonalInfo(_) => SectionKey::PersonalInfo,
            SectionData::Education(_) => SectionKey::Education,
            SectionData::Documents(_) => SectionKey::Documents,
            SectionData::SelectedPackage(_) => SectionKey::SelectedPackage,
            SectionData::ReviewData(_) => SectionKey::ReviewData,
        }
    }
}

/// Processor-reported payment status, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentStatus(pub String);

impl PaymentStatus {
    pub const SUCCEEDED: &'static str = "succeeded";
    pub const PROCESSING: &'static str = "processing";
    pub const REQUIRES_PAYMENT_METHOD: &'static str = "requires_payment_method";

    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_succeeded(&self) -> bool {
        self.0 == Self::SUCCEEDED
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Captured charge as reported by the processor. Read-only for this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub reference: String,
    pub status: PaymentStatus,
    /// Amount in the processor's minor currency unit.
    pub amount: i64,
    pub currency: String,
}

impl PaymentRecord {
    /// `$149.00 USD` style rendering of the minor-unit amount.
    pub fn display_amount(&self) -> String {
        let sign = if self.amount < 0 { "-" } else { "" };
        let absolute = self.amount.unsigned_abs();
        format!(
            "{sign}${}.{:02} {}",
            absolute / 100,
            absolute % 100,
            self.currency.to_uppercase()
        )
    }
}
