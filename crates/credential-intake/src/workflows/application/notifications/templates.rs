use std::fmt::Write;

use crate::workflows::application::domain::{DraftApplication, PaymentRecord};

/// Subject plus both bodies of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Branding shared by every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub organization: String,
    pub year: i32,
}

/// One row of the admin message's document section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentListing {
    pub name: String,
    pub document_type: String,
    pub delivery: ListingDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingDelivery {
    Attached,
    Link(String),
}

const SECTION_RULE: &str = "<hr style=\"border: 0; border-top: 1px solid #eee; margin: 20px 0;\">";

pub fn verification_code(branding: &Branding, code: &str, valid_minutes: i64) -> RenderedMessage {
    let organization = escape_html(&branding.organization);
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\"><title>Your Verification Code</title></head>");
    html.push_str("<body style=\"background-color: #f4f7f6; margin: 0; padding: 0; font-family: Arial, sans-serif;\">");
    html.push_str("<div style=\"max-width: 600px; margin: 20px auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px; background-color: #ffffff;\">");
    writeln!(
        html,
        "<div style=\"text-align: center; padding-bottom: 20px; border-bottom: 1px solid #ddd;\"><h1 style=\"color: #333; margin: 0;\">{organization}</h1></div>"
    )
    .expect("write header");
    html.push_str("<p>Hello,</p>");
    writeln!(
        html,
        "<p>Please use the following verification code to complete your action. The code is valid for {valid_minutes} minutes.</p>"
    )
    .expect("write validity");
    writeln!(
        html,
        "<div style=\"text-align: center; margin: 20px 0;\"><span style=\"display: inline-block; padding: 15px 25px; font-size: 32px; font-weight: bold; letter-spacing: 5px; background-color: #f0f2f5; border-radius: 6px;\">{}</span></div>",
        escape_html(code)
    )
    .expect("write code");
    html.push_str("<p>If you did not request this code, you can safely ignore this email.</p>");
    writeln!(html, "<p>Thanks,<br/>The {organization} Team</p>").expect("write signature");
    writeln!(
        html,
        "<div style=\"text-align: center; font-size: 12px; color: #999; padding-top: 20px; border-top: 1px solid #ddd;\"><p>&copy; {} {organization}. All rights reserved.</p></div>",
        branding.year
    )
    .expect("write footer");
    html.push_str("</div></body></html>");

    RenderedMessage {
        subject: "Your Verification Code".to_string(),
        html,
        text: format!(
            "Your verification code is: {code}\nIt is valid for {valid_minutes} minutes.\n"
        ),
    }
}

pub fn admin_application(
    branding: &Branding,
    draft: &DraftApplication,
    payment: &PaymentRecord,
    documents: &[DocumentListing],
) -> RenderedMessage {
    let info = &draft.personal_info;
    let package = &draft.selected_package;
    let mut html = String::new();
    let mut text = String::new();

    html.push_str("<body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">");
    html.push_str("<div style=\"max-width: 600px; margin: auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px;\">");
    html.push_str("<h1 style=\"color: #0056b3; font-size: 24px;\">New Credential Evaluation Application</h1>");
    html.push_str(SECTION_RULE);
    writeln!(text, "New Credential Evaluation Application\n").expect("write title");

    html.push_str("<h2 style=\"color: #0056b3;\">1. Personal Information</h2><ul>");
    writeln!(
        html,
        "<li><strong>Name:</strong> {} {}</li>",
        escape_html(&info.first_name),
        escape_html(&info.last_name)
    )
    .expect("write name");
    writeln!(
        html,
        "<li><strong>Email:</strong> <a href=\"mailto:{0}\">{0}</a></li>",
        escape_html(&info.email)
    )
    .expect("write email");
    writeln!(html, "<li><strong>Phone:</strong> {}</li>", escape_html(&info.phone))
        .expect("write phone");
    writeln!(
        html,
        "<li><strong>Country of Origin:</strong> {}</li>",
        escape_html(&info.country)
    )
    .expect("write country");
    let address = format!(
        "{}, {}, {}, {}",
        info.address,
        info.city,
        info.state.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("N/A"),
        info.zip_code
    );
    writeln!(html, "<li><strong>Address:</strong> {}</li></ul>", escape_html(&address))
        .expect("write address");
    writeln!(
        text,
        "1. Personal Information\nName: {} {}\nEmail: {}\nPhone: {}\nCountry of Origin: {}\nAddress: {}\n",
        info.first_name, info.last_name, info.email, info.phone, info.country, address
    )
    .expect("write personal text");

    html.push_str(SECTION_RULE);
    html.push_str("<h2 style=\"color: #0056b3;\">2. Education History</h2><ul>");
    text.push_str("2. Education History\n");
    if draft.education.education_history.is_empty() {
        html.push_str("<li>No education history was provided.</li>");
        text.push_str("No education history was provided.\n");
    }
    for entry in &draft.education.education_history {
        let gpa = entry
            .gpa
            .as_deref()
            .filter(|gpa| !gpa.trim().is_empty())
            .unwrap_or("Not Provided");
        writeln!(
            html,
            "<li style=\"margin-bottom: 15px;\"><strong>Institution:</strong> {}, {}<br><strong>Degree:</strong> {} in {}<br><strong>Period:</strong> {} - {}<br><strong>GPA:</strong> {}</li>",
            escape_html(&entry.institution),
            escape_html(&entry.country),
            escape_html(&entry.degree_type),
            escape_html(&entry.field_of_study),
            escape_html(&entry.start_year),
            escape_html(&entry.end_year),
            escape_html(gpa)
        )
        .expect("write education entry");
        writeln!(
            text,
            "- {}, {}: {} in {} ({} - {}), GPA: {}",
            entry.institution,
            entry.country,
            entry.degree_type,
            entry.field_of_study,
            entry.start_year,
            entry.end_year,
            gpa
        )
        .expect("write education text");
    }
    html.push_str("</ul>");
    text.push('\n');

    html.push_str(SECTION_RULE);
    html.push_str("<h2 style=\"color: #0056b3;\">3. Package Selection</h2><ul>");
    writeln!(
        html,
        "<li><strong>Package Name:</strong> {}</li><li><strong>Price:</strong> ${:.2}</li><li><strong>Processing Time:</strong> {}</li>",
        escape_html(&package.name),
        package.price,
        escape_html(&package.processing_time)
    )
    .expect("write package");
    html.push_str("<li><strong>Package Features:</strong><ul>");
    for feature in &package.features {
        writeln!(html, "<li>{}</li>", escape_html(feature)).expect("write feature");
    }
    html.push_str("</ul></li></ul>");
    writeln!(
        text,
        "3. Package Selection\nPackage Name: {}\nPrice: ${:.2}\nProcessing Time: {}\n",
        package.name, package.price, package.processing_time
    )
    .expect("write package text");

    html.push_str(SECTION_RULE);
    html.push_str("<h2 style=\"color: #0056b3;\">4. Payment Confirmation</h2>");
    writeln!(
        html,
        "<ul style=\"list-style-type: none; padding: 0;\"><li style=\"background: #f0f8ff; padding: 10px; border-radius: 5px;\"><strong>Status:</strong> <span style=\"color: green; font-weight: bold;\">{}</span><br><strong>Transaction ID:</strong> {}<br><strong>Amount Paid:</strong> {}</li></ul>",
        escape_html(payment.status.as_str()),
        escape_html(&payment.reference),
        escape_html(&payment.display_amount())
    )
    .expect("write payment");
    writeln!(
        text,
        "4. Payment Confirmation\nStatus: {}\nTransaction ID: {}\nAmount Paid: {}\n",
        payment.status,
        payment.reference,
        payment.display_amount()
    )
    .expect("write payment text");

    html.push_str(SECTION_RULE);
    html.push_str("<h2 style=\"color: #0056b3;\">5. Documents</h2><ul>");
    text.push_str("5. Documents\n");
    if documents.is_empty() {
        html.push_str("<li>No documents were uploaded.</li>");
        text.push_str("No documents were uploaded.\n");
    }
    for document in documents {
        let label = if document.document_type.trim().is_empty() {
            escape_html(&document.name)
        } else {
            format!(
                "{} ({})",
                escape_html(&document.name),
                escape_html(&document.document_type)
            )
        };
        match &document.delivery {
            ListingDelivery::Attached => {
                writeln!(html, "<li>{label} (attached)</li>").expect("write attached document");
                writeln!(text, "- {} (attached)", document.name).expect("write attached text");
            }
            ListingDelivery::Link(url) => {
                writeln!(
                    html,
                    "<li><a href=\"{}\" style=\"color: #0056b3;\">{label}</a></li>",
                    escape_html(url)
                )
                .expect("write document link");
                writeln!(text, "- {}: {}", document.name, url).expect("write link text");
            }
        }
    }
    html.push_str("</ul></div></body>");

    let applicant = format!("{} {}", info.first_name.trim(), info.last_name.trim());
    RenderedMessage {
        subject: format!("New Application: {}", applicant.trim()),
        html,
        text,
    }
}

pub fn applicant_confirmation(
    branding: &Branding,
    draft: &DraftApplication,
    payment: &PaymentRecord,
) -> RenderedMessage {
    let package = &draft.selected_package;
    let organization = escape_html(&branding.organization);
    let mut html = String::new();

    html.push_str("<body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">");
    html.push_str("<div style=\"max-width: 600px; margin: auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px;\">");
    writeln!(
        html,
        "<h1 style=\"color: #0056b3; font-size: 24px;\">Thank You, {}!</h1>",
        escape_html(draft.personal_info.first_name.trim())
    )
    .expect("write greeting");
    html.push_str("<p>We've successfully received your application. This email confirms your order and what to expect next.</p>");
    html.push_str("<div style=\"background: #f0f8ff; padding: 15px; border: 1px solid #ddeeff; border-radius: 5px; margin: 20px 0;\">");
    html.push_str("<h2 style=\"margin-top: 0; color: #0056b3; font-size: 18px;\">Your Order Summary</h2>");
    writeln!(
        html,
        "<p><strong>Package Purchased:</strong><br>{}</p><p><strong>Estimated Processing Time:</strong><br><span style=\"font-weight: bold;\">{}</span></p><p><strong>Amount Paid:</strong><br>{}</p><p><strong>Transaction ID:</strong><br>{}</p>",
        escape_html(&package.name),
        escape_html(&package.processing_time),
        escape_html(&payment.display_amount()),
        escape_html(&payment.reference)
    )
    .expect("write order summary");
    html.push_str("</div>");
    html.push_str("<p>Our team will now begin reviewing your documents. We will contact you if any additional information is required. You can expect your evaluation to be completed within the processing time stated above.</p>");
    html.push_str("<p>If you have any questions, feel free to reply directly to this email.</p>");
    writeln!(
        html,
        "<p>Sincerely,</p><p><strong>The Team at {organization}</strong></p><p style=\"font-size: 12px; color: #999;\">&copy; {} {organization}</p>",
        branding.year
    )
    .expect("write signature");
    html.push_str("</div></body>");

    let text = format!(
        "Thank you, {}!\n\nWe've successfully received your application.\n\nPackage Purchased: {}\nEstimated Processing Time: {}\nAmount Paid: {}\nTransaction ID: {}\n\nSincerely,\nThe Team at {}\n",
        draft.personal_info.first_name.trim(),
        package.name,
        package.processing_time,
        payment.display_amount(),
        payment.reference,
        branding.organization
    );

    RenderedMessage {
        subject: "We've Received Your Application!".to_string(),
        html,
        text,
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::application::catalog::PackageTier;
    use crate::workflows::application::domain::{EducationEntry, PaymentStatus};

    fn branding() -> Branding {
        Branding {
            organization: "Center of Education Transition".to_string(),
            year: 2026,
        }
    }

    fn payment() -> PaymentRecord {
        PaymentRecord {
            reference: "pi_3Abc".to_string(),
            status: PaymentStatus::new(PaymentStatus::SUCCEEDED),
            amount: 14900,
            currency: "usd".to_string(),
        }
    }

    #[test]
    fn admin_message_escapes_applicant_input() {
        let mut draft = DraftApplication::default();
        draft.personal_info.first_name = "<script>alert(1)</script>".to_string();
        draft.personal_info.last_name = "O'Neil".to_string();
        draft.education.education_history.push(EducationEntry {
            institution: "Ecole & Co".to_string(),
            ..EducationEntry::default()
        });
        draft.selected_package = PackageTier::EssentialDocument.selection();

        let message = admin_application(&branding(), &draft, &payment(), &[]);

        assert!(!message.html.contains("<script>"));
        assert!(message.html.contains("&lt;script&gt;"));
        assert!(message.html.contains("O&#39;Neil"));
        assert!(message.html.contains("Ecole &amp; Co"));
        assert!(message.html.contains("GPA:</strong> Not Provided"));
        assert!(message.html.contains("$149.00 USD"));
        assert!(message.html.contains("No documents were uploaded."));
    }

    #[test]
    fn admin_message_lists_attachments_and_links() {
        let draft = DraftApplication::default();
        let documents = vec![
            DocumentListing {
                name: "diploma.pdf".to_string(),
                document_type: "Diploma".to_string(),
                delivery: ListingDelivery::Attached,
            },
            DocumentListing {
                name: "transcript.pdf".to_string(),
                document_type: String::new(),
                delivery: ListingDelivery::Link("https://files.example/t?token=a&b".to_string()),
            },
        ];

        let message = admin_application(&branding(), &draft, &payment(), &documents);

        assert!(message.html.contains("diploma.pdf (Diploma) (attached)"));
        assert!(message.html.contains("href=\"https://files.example/t?token=a&amp;b\""));
        assert!(message.text.contains("- transcript.pdf: https://files.example/t?token=a&b"));
    }

    #[test]
    fn verification_message_carries_code_and_branding() {
        let message = verification_code(&branding(), "048213", 10);
        assert!(message.html.contains("048213"));
        assert!(message.html.contains("valid for 10 minutes"));
        assert!(message.html.contains("&copy; 2026 Center of Education Transition"));
        assert_eq!(message.text, "Your verification code is: 048213\nIt is valid for 10 minutes.\n");
    }

    #[test]
    fn applicant_message_summarizes_order() {
        let mut draft = DraftApplication::default();
        draft.personal_info.first_name = "Ada".to_string();
        draft.selected_package = PackageTier::CareerSuccess.selection();

        let message = applicant_confirmation(&branding(), &draft, &payment());

        assert_eq!(message.subject, "We've Received Your Application!");
        assert!(message.html.contains("Thank You, Ada!"));
        assert!(message.html.contains("3-5 business days"));
        assert!(message.text.contains("Transaction ID: pi_3Abc"));
    }
}
