use crate::infra::{verification_code, CapturingMailer, DemoProcessor};
use chrono::{Duration, Utc};
use clap::Args;
use credential_intake::config::AppConfig;
use credential_intake::error::AppError;
use credential_intake::telemetry;
use credential_intake::workflows::application::documents::{
    MemoryDocumentStore, OrphanReconciler, UploadedFile, UPLOAD_PREFIX,
};
use credential_intake::workflows::application::services::document_inventory_from_config;
use credential_intake::workflows::application::verification::{
    normalize_email, MemoryChallengeStore,
};
use credential_intake::workflows::application::wizard::{
    LocalIntakeGateway, MemoryDraftStorage, StayPut,
};
use credential_intake::workflows::application::{
    catalog, EducationEntry, EducationHistory, IntakeComponents, IntakeServices, PackageTier,
    PaymentStatus, PersonalInfo, ReviewConsent, SectionData, SenderIdentity, StepWizard,
    SubmissionOutcome, Transition,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant email address used for verification and the confirmation message
    #[arg(long, default_value = "applicant@example.com")]
    pub(crate) email: String,
    /// Staff mailbox that receives the completed application
    #[arg(long, default_value = "admissions@example.org")]
    pub(crate) admin_email: String,
    /// Package id from the catalog (see `packages`)
    #[arg(long, default_value = "essential-document")]
    pub(crate) package: String,
    /// Documents to upload; a sample transcript is generated when none are given
    #[arg(long = "document")]
    pub(crate) documents: Vec<PathBuf>,
    /// Status the processor reports for the payment
    #[arg(long, default_value = PaymentStatus::SUCCEEDED)]
    pub(crate) payment_status: String,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PackagesArgs {
    /// Print the catalog as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ReconcileArgs {
    /// Objects younger than this many days are never collected
    #[arg(long, default_value_t = 7)]
    pub(crate) grace_days: i64,
    /// File listing referenced locators, one per line
    #[arg(long)]
    pub(crate) referenced: Option<PathBuf>,
    /// Delete orphaned objects instead of only reporting them
    #[arg(long)]
    pub(crate) apply: bool,
}

pub(crate) fn run_packages(args: PackagesArgs) -> Result<(), AppError> {
    let packages = catalog();
    if args.json {
        let json = serde_json::to_string_pretty(&packages)
            .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?;
        println!("{json}");
        return Ok(());
    }

    println!("Evaluation packages");
    for package in packages {
        let marker = if package.popular { " (most popular)" } else { "" };
        println!(
            "  {:<22} ${:>7.2}  {}{}",
            package.id, package.price, package.name, marker
        );
        println!("    {} | {}", package.processing_time, package.description);
        for feature in &package.features {
            println!("    - {feature}");
        }
    }
    Ok(())
}

pub(crate) async fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let referenced: HashSet<String> = match &args.referenced {
        Some(path) => tokio::fs::read_to_string(path)
            .await?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        None => HashSet::new(),
    };

    let inventory = document_inventory_from_config(&config.storage)?;
    let reconciler = OrphanReconciler::new(inventory, UPLOAD_PREFIX, Duration::days(args.grace_days));
    let report = reconciler.reconcile(&referenced, !args.apply).await?;

    println!(
        "Document reconciliation ({})",
        if report.dry_run { "dry run" } else { "applied" }
    );
    println!("  Scanned: {}", report.scanned);
    println!("  Referenced: {}", report.referenced);
    println!("  Within grace period: {}", report.within_grace);
    println!("  Orphaned: {}", report.orphaned.len());
    for locator in &report.orphaned {
        println!("    - {locator}");
    }
    if !report.dry_run {
        println!("  Deleted: {}", report.deleted.len());
        for locator in &report.failed {
            println!("  Failed to delete: {locator}");
        }
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        email,
        admin_email,
        package,
        documents,
        payment_status,
    } = args;

    let Some(tier) = PackageTier::from_id(&package) else {
        println!("Unknown package '{package}'. Run `packages` to list the catalog.");
        return Ok(());
    };

    let mailer = CapturingMailer::default();
    let processor = DemoProcessor::default();
    let components = IntakeComponents::new(
        Arc::new(MemoryChallengeStore::default()),
        Arc::new(MemoryDocumentStore::default()),
        Arc::new(processor.clone()),
        Arc::new(mailer.clone()),
        SenderIdentity {
            from_address: "no-reply@example.org".to_string(),
            admin_address: admin_email.clone(),
            organization: "Center of Education Transition".to_string(),
        },
    );
    let services = Arc::new(IntakeServices::new(components));
    let storage = Arc::new(MemoryDraftStorage::default());
    let mut wizard = StepWizard::new(
        Arc::new(LocalIntakeGateway::new(services)),
        storage,
        Arc::new(StayPut),
    );

    println!("Credential intake demo");
    println!("  Step {}", wizard.current_step());

    wizard.update_section(SectionData::PersonalInfo(sample_personal_info(&email)));
    match wizard.next().await {
        Ok(Transition::AwaitingVerification { email }) => {
            println!("  Verification code sent to {email}");
        }
        Ok(other) => println!("  Unexpected transition: {other:?}"),
        Err(err) => {
            println!("  Personal information rejected: {err}");
            return Ok(());
        }
    }

    let Some(code) = mailer
        .last_to(&normalize_email(&email))
        .and_then(|message| verification_code(&message.text))
    else {
        println!("  No verification code was captured");
        return Ok(());
    };
    if let Err(err) = wizard.confirm_email(&code).await {
        println!("  Verification failed: {err}");
        return Ok(());
    }
    println!("  Email verified; step {}", wizard.current_step());

    wizard.update_section(SectionData::Education(sample_education()));
    if let Err(err) = wizard.next().await {
        println!("  Education rejected: {err}");
        return Ok(());
    }
    println!("  Step {} ({}% complete)", wizard.current_step(), wizard.progress_percent());

    for file in load_documents(&documents).await? {
        let name = file.name.clone();
        match wizard.upload_document(file).await {
            Ok(reference) => println!("  Uploaded {name} as {}", reference.locator),
            Err(err) => println!("  Upload of {name} failed: {err}"),
        }
    }
    if let Err(err) = wizard.next().await {
        println!("  Documents rejected: {err}");
        return Ok(());
    }

    wizard.select_package(tier);
    if let Err(err) = wizard.next().await {
        println!("  Package rejected: {err}");
        return Ok(());
    }
    println!("  Selected {} (${:.2})", tier.name(), tier.price());

    wizard.update_section(SectionData::ReviewData(ReviewConsent {
        terms_accepted: true,
        payment_id: None,
    }));
    if let Err(err) = wizard.next().await {
        println!("  Review rejected: {err}");
        return Ok(());
    }
    println!(
        "  Draft stored for payment handoff; step {} ({}% complete)",
        wizard.current_step(),
        wizard.progress_percent()
    );

    let token = match wizard.begin_payment().await {
        Ok(token) => token,
        Err(err) => {
            println!("  Payment could not start: {err}");
            return Ok(());
        }
    };
    let Some(reference) = processor.reference_for(token.as_str()) else {
        println!("  Processor returned an unknown token");
        return Ok(());
    };
    processor.settle(&reference, &payment_status);
    println!("  Payment {reference} reported as {payment_status}");

    let outcome = wizard
        .complete_submission(&reference, &PaymentStatus::new(payment_status))
        .await;
    match &outcome {
        SubmissionOutcome::Submitted { receipt, message } => {
            println!("  {message}");
            println!("  Applicant notified: {}", receipt.applicant_notified);
        }
        other => println!("  {}", other.message()),
    }

    println!("\nMessages dispatched");
    for message in mailer.messages() {
        println!(
            "  To {:<28} {} ({} attachment(s))",
            message.to,
            message.subject,
            message.attachments.len()
        );
    }
    Ok(())
}

async fn load_documents(paths: &[PathBuf]) -> Result<Vec<UploadedFile>, AppError> {
    if paths.is_empty() {
        return Ok(vec![UploadedFile {
            name: "sample-transcript.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            document_type: "Transcript".to_string(),
            bytes: format!("%PDF-1.4\n% sample transcript generated {}\n", Utc::now())
                .into_bytes(),
        }]);
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(UploadedFile {
            content_type: mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string()),
            name,
            document_type: "Supporting Document".to_string(),
            bytes,
        });
    }
    Ok(files)
}

fn sample_personal_info(email: &str) -> PersonalInfo {
    PersonalInfo {
        first_name: "Amara".to_string(),
        last_name: "Okafor".to_string(),
        email: email.to_string(),
        phone: "+1 555 014 2210".to_string(),
        country: "Nigeria".to_string(),
        address: "14 Marina Road".to_string(),
        city: "Lagos".to_string(),
        state: None,
        zip_code: "101001".to_string(),
    }
}

fn sample_education() -> EducationHistory {
    EducationHistory {
        education_history: vec![EducationEntry {
            institution: "University of Lagos".to_string(),
            country: "Nigeria".to_string(),
            degree_type: "Bachelor".to_string(),
            field_of_study: "Civil Engineering".to_string(),
            start_year: "2014".to_string(),
            end_year: "2018".to_string(),
            gpa: Some("4.2/5.0".to_string()),
        }],
    }
}
