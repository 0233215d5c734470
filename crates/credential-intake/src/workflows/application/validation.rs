//! Per-section validation contracts. Each validator reports only the first rule the
//! section violates, in field order.

use super::domain::{
    DocumentSet, DraftApplication, EducationEntry, EducationHistory, PersonalInfo, ReviewConsent,
    SectionKey,
};
use super::catalog::PackageSelection;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub section: SectionKey,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(section: SectionKey, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section,
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_section(draft: &DraftApplication, key: SectionKey) -> Result<(), ValidationError> {
    match key {
        SectionKey::PersonalInfo => validate_personal_info(&draft.personal_info),
        SectionKey::Education => validate_education(&draft.education),
        SectionKey::Documents => validate_documents(&draft.documents),
        SectionKey::SelectedPackage => validate_package(&draft.selected_package),
        SectionKey::ReviewData => validate_review(&draft.review_data),
    }
}

pub fn validate_personal_info(info: &PersonalInfo) -> Result<(), ValidationError> {
    let section = SectionKey::PersonalInfo;
    min_len(section, "firstName", &info.first_name, 2, "First name must be at least 2 characters.")?;
    min_len(section, "lastName", &info.last_name, 2, "Last name must be at least 2 characters.")?;
    if !is_valid_email(&info.email) {
        return Err(ValidationError::new(
            section,
            "email",
            "Please enter a valid email address.",
        ));
    }
    min_len(section, "phone", &info.phone, 10, "Please enter a valid phone number.")?;
    min_len(section, "country", &info.country, 1, "Please select your country of origin.")?;
    min_len(
        section,
        "address",
        &info.address,
        2,
        "Please enter your full address. Must be at least 2 characters.",
    )?;
    min_len(section, "city", &info.city, 2, "Please enter your city.")?;
    min_len(section, "zipCode", &info.zip_code, 3, "Please enter a valid postal/zip code.")
}

pub fn validate_education(education: &EducationHistory) -> Result<(), ValidationError> {
    if education.education_history.is_empty() {
        return Err(ValidationError::new(
            SectionKey::Education,
            "educationHistory",
            "Please add at least one education entry to proceed.",
        ));
    }

    education
        .education_history
        .iter()
        .enumerate()
        .try_for_each(|(index, entry)| validate_education_entry(index, entry))
}

fn validate_education_entry(index: usize, entry: &EducationEntry) -> Result<(), ValidationError> {
    let section = SectionKey::Education;
    let field = |name: &str| format!("educationHistory[{index}].{name}");

    min_len(section, field("institution"), &entry.institution, 2, "Institution name is required.")?;
    min_len(section, field("country"), &entry.country, 1, "Country is required.")?;
    min_len(section, field("degreeType"), &entry.degree_type, 1, "Degree type is required.")?;
    min_len(section, field("fieldOfStudy"), &entry.field_of_study, 2, "Field of study is required.")?;
    min_len(section, field("startYear"), &entry.start_year, 1, "A valid start year is required.")?;
    min_len(section, field("endYear"), &entry.end_year, 1, "A valid end year is required.")?;

    if ends_before_start(entry.start_year.trim(), entry.end_year.trim()) {
        return Err(ValidationError::new(
            section,
            field("endYear"),
            "End year cannot be before the start year.",
        ));
    }
    Ok(())
}

fn ends_before_start(start: &str, end: &str) -> bool {
    match (start.parse::<i32>(), end.parse::<i32>()) {
        (Ok(start), Ok(end)) => end < start,
        _ => end < start,
    }
}

pub fn validate_documents(documents: &DocumentSet) -> Result<(), ValidationError> {
    if documents.files.is_empty() {
        return Err(ValidationError::new(
            SectionKey::Documents,
            "files",
            "Please upload at least one document.",
        ));
    }
    Ok(())
}

pub fn validate_package(selection: &PackageSelection) -> Result<(), ValidationError> {
    if selection.tier().is_none() {
        return Err(ValidationError::new(
            SectionKey::SelectedPackage,
            "id",
            "Please select an evaluation package.",
        ));
    }
    Ok(())
}

pub fn validate_review(review: &ReviewConsent) -> Result<(), ValidationError> {
    if !review.terms_accepted {
        return Err(ValidationError::new(
            SectionKey::ReviewData,
            "termsAccepted",
            "You must accept the terms and conditions to submit.",
        ));
    }
    Ok(())
}

/// Structural address check: one `@`, a non-empty local part, and a dotted domain.
pub fn is_valid_email(raw: &str) -> bool {
    let email = raw.trim();
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

fn min_len(
    section: SectionKey,
    field: impl Into<String>,
    value: &str,
    min: usize,
    message: &str,
) -> Result<(), ValidationError> {
    if value.trim().chars().count() < min {
        return Err(ValidationError::new(section, field, message));
    }
    Ok(())
}
