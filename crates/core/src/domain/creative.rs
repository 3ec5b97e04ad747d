use crate::domain::naming::AdName;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const UNLABELED: &str = "Unlabeled";

/// One ad creative over a reporting period, after ingestion normalized it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdCreativeRecord {
    pub ad_id: String,
    pub ad_name: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub objective: String,
    pub funnel_stage: FunnelStage,
    pub format: CreativeFormat,
    pub creative_id: String,
    pub primary_text: String,
    pub headline: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub status: String,
    pub created_time: Option<DateTime<Utc>>,
    pub spend: Decimal,
    pub revenue: Decimal,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub creator: Option<String>,
    pub angle: Option<Angle>,
}

impl AdCreativeRecord {
    /// Creator from the explicit field, else from the `DATE_CREATOR_CONCEPT_FORMAT` ad name.
    pub fn creator_label(&self) -> String {
        self.creator
            .clone()
            .or_else(|| AdName::parse(&self.ad_name).map(|n| n.creator))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    pub fn concept_label(&self) -> String {
        AdName::parse(&self.ad_name)
            .map(|n| n.concept)
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    /// `YYYY-MM`, preferring the date encoded in the ad name over `created_time`.
    pub fn launch_month(&self) -> String {
        if let Some(name) = AdName::parse(&self.ad_name) {
            return name.launch_month();
        }
        self.created_time
            .map(|t| t.format("%Y-%m").to_string())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    pub fn angle_label(&self) -> &'static str {
        self.angle.map(Angle::label).unwrap_or(UNLABELED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunnelStage {
    #[serde(rename = "TOF")]
    Tof,
    #[serde(rename = "MOF")]
    Mof,
    #[serde(rename = "BOF")]
    Bof,
    Unknown,
}

impl FunnelStage {
    pub fn from_objective(objective: &str) -> Self {
        match objective.trim().to_ascii_uppercase().as_str() {
            "OUTCOME_AWARENESS" | "OUTCOME_ENGAGEMENT" | "REACH" | "BRAND_AWARENESS"
            | "VIDEO_VIEWS" | "POST_ENGAGEMENT" | "PAGE_LIKES" => Self::Tof,
            "OUTCOME_LEADS" | "OUTCOME_TRAFFIC" | "OUTCOME_APP_PROMOTION" | "LINK_CLICKS"
            | "LEAD_GENERATION" | "MESSAGES" => Self::Mof,
            "OUTCOME_SALES" | "CONVERSIONS" | "CATALOG_SALES" | "STORE_TRAFFIC" => Self::Bof,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Tof => "TOF",
            Self::Mof => "MOF",
            Self::Bof => "BOF",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CreativeFormat {
    Video,
    Static,
    Carousel,
    Collection,
    Slideshow,
    /// A creative type the mapping does not know, kept verbatim.
    Other(String),
    Unknown,
}

impl CreativeFormat {
    pub fn from_creative_type(creative_type: &str) -> Self {
        let t = creative_type.trim();
        match t.to_ascii_uppercase().as_str() {
            "VIDEO" => Self::Video,
            "IMAGE" | "PHOTO" | "STATIC" => Self::Static,
            "CAROUSEL" => Self::Carousel,
            "COLLECTION" => Self::Collection,
            "SLIDESHOW" => Self::Slideshow,
            "" => Self::Unknown,
            _ => Self::Other(t.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Video => "Video",
            Self::Static => "Static",
            Self::Carousel => "Carousel",
            Self::Collection => "Collection",
            Self::Slideshow => "Slideshow",
            Self::Other(name) => name,
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for CreativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for CreativeFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// The persuasive style of a creative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Angle {
    #[serde(rename = "Problem/Solution")]
    ProblemSolution,
    #[serde(rename = "UGC Style")]
    UgcStyle,
    #[serde(rename = "Social Proof")]
    SocialProof,
    #[serde(rename = "Product Demo")]
    ProductDemo,
    #[serde(rename = "Before/After")]
    BeforeAfter,
    Other,
}

impl Angle {
    pub const ALL: [Angle; 6] = [
        Angle::ProblemSolution,
        Angle::UgcStyle,
        Angle::SocialProof,
        Angle::ProductDemo,
        Angle::BeforeAfter,
        Angle::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ProblemSolution => "Problem/Solution",
            Self::UgcStyle => "UGC Style",
            Self::SocialProof => "Social Proof",
            Self::ProductDemo => "Product Demo",
            Self::BeforeAfter => "Before/After",
            Self::Other => "Other",
        }
    }

    /// Maps free-form classifier output onto the fixed set. Anything unrecognized is `Other`.
    pub fn normalize(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "problemsolution" => Self::ProblemSolution,
            "ugcstyle" | "ugc" => Self::UgcStyle,
            "socialproof" => Self::SocialProof,
            "productdemo" | "demo" => Self::ProductDemo,
            "beforeafter" => Self::BeforeAfter,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
pub(crate) fn test_record(ad_id: &str, spend: Decimal, revenue: Decimal) -> AdCreativeRecord {
    AdCreativeRecord {
        ad_id: ad_id.to_string(),
        ad_name: format!("Ad {ad_id}"),
        campaign_id: String::new(),
        campaign_name: String::new(),
        objective: String::new(),
        funnel_stage: FunnelStage::Unknown,
        format: CreativeFormat::Unknown,
        creative_id: format!("cr_{ad_id}"),
        primary_text: String::new(),
        headline: String::new(),
        image_url: String::new(),
        thumbnail_url: String::new(),
        status: String::new(),
        created_time: None,
        spend,
        revenue,
        impressions: 0,
        clicks: 0,
        conversions: 0,
        creator: None,
        angle: None,
    }
}
