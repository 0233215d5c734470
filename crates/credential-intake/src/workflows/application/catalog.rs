use serde::{Deserialize, Serialize};

/// The evaluation packages on offer. The catalog is closed: prices are resolved from
/// here, never from free-form input, whenever a package id is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageTier {
    EssentialDocument,
    ProfessionalPlus,
    CareerSuccess,
    PremiumTransition,
}

impl PackageTier {
    pub const ALL: [PackageTier; 4] = [
        PackageTier::EssentialDocument,
        PackageTier::ProfessionalPlus,
        PackageTier::CareerSuccess,
        PackageTier::PremiumTransition,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            PackageTier::EssentialDocument => "essential-document",
            PackageTier::ProfessionalPlus => "professional-plus",
            PackageTier::CareerSuccess => "career-success",
            PackageTier::PremiumTransition => "premium-transition",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL.into_iter().find(|tier| tier.id() == id)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PackageTier::EssentialDocument => "Essential Document Evaluation",
            PackageTier::ProfessionalPlus => "Professional Plus (Course-By-Course)",
            PackageTier::CareerSuccess => "Career Success Package",
            PackageTier::PremiumTransition => "Premium Career Transition",
        }
    }

    /// Price in cents.
    pub const fn price_minor(self) -> u64 {
        match self {
            PackageTier::EssentialDocument => 14_900,
            PackageTier::ProfessionalPlus => 22_900,
            PackageTier::CareerSuccess => 34_900,
            PackageTier::PremiumTransition => 49_900,
        }
    }

    pub fn price(self) -> f64 {
        self.price_minor() as f64 / 100.0
    }

    pub const fn processing_time(self) -> &'static str {
        match self {
            PackageTier::EssentialDocument => "7-10 business days",
            PackageTier::ProfessionalPlus => "5-7 business days",
            PackageTier::CareerSuccess => "3-5 business days",
            PackageTier::PremiumTransition => "1-2 business days",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            PackageTier::EssentialDocument => {
                "Perfect for employment, immigration, and community college admission."
            }
            PackageTier::ProfessionalPlus => {
                "Detailed academic analysis for university admissions and licensing."
            }
            PackageTier::CareerSuccess => {
                "Complete course evaluation with extensive career support."
            }
            PackageTier::PremiumTransition => {
                "Everything plus personalized coaching and premium support."
            }
        }
    }

    pub const fn features(self) -> &'static [&'static str] {
        match self {
            PackageTier::EssentialDocument => &[
                "Document-by-document evaluation",
                "U.S. career roadmap",
                "LinkedIn profile optimization guide",
                "Insights into U.S. workplace culture and hiring practices",
                "30-minute career success consultation",
                "Digital copy of evaluation",
                "Job search resources toolkit",
            ],
            PackageTier::ProfessionalPlus => &[
                "Course-by-course evaluation",
                "Detailed academic analysis",
                "Guidance to align your skills & experience with U.S. job market demands",
                "Digital + hard copy reports",
                "Career pathway overview",
                "Professional licensing roadmap",
                "Premium success resources toolkit",
            ],
            PackageTier::CareerSuccess => &[
                "Complete course-by-course evaluation",
                "Career pathway roadmap",
                "Industry-specific guidance",
                "Job search strategy consultation",
                "Resume optimization tips",
                "Recommendations for in-demand certifications",
                "3 professional network introductions",
                "6-month email support access",
            ],
            PackageTier::PremiumTransition => &[
                "Everything in Career Success Package",
                "1-on-1 career consultation (30 minutes)",
                "Personalized education transition plan",
                "Industry networking guidance",
                "Follow-up support (60 days)",
                "Help with interview prep, and job search strategies",
                "Skills gap analysis & certificate recommendations",
                "VIP document handling",
            ],
        }
    }

    pub const fn popular(self) -> bool {
        matches!(self, PackageTier::CareerSuccess)
    }

    /// The selection snapshot stored in a draft when this tier is chosen.
    pub fn selection(self) -> PackageSelection {
        PackageSelection {
            id: self.id().to_string(),
            name: self.name().to_string(),
            price: self.price(),
            description: self.description().to_string(),
            processing_time: self.processing_time().to_string(),
            features: self.features().iter().map(|f| f.to_string()).collect(),
            popular: self.popular(),
        }
    }
}

/// Package chosen for a draft, as carried in the client-held application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageSelection {
    pub id: String,
    pub name: String,
    /// Major currency units, as displayed to the applicant.
    pub price: f64,
    pub description: String,
    pub processing_time: String,
    pub features: Vec<String>,
    pub popular: bool,
}

impl PackageSelection {
    pub fn tier(&self) -> Option<PackageTier> {
        PackageTier::from_id(&self.id)
    }
}

/// The full catalog in display order.
pub fn catalog() -> Vec<PackageSelection> {
    PackageTier::ALL.into_iter().map(PackageTier::selection).collect()
}
