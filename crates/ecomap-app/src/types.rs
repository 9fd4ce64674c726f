use crate::geo::GeoPoint;
use crate::lifecycle::{ApprovalStatus, JobStatus, RedemptionStatus, ReportStatus};
use chrono::{DateTime, Utc};
use ecomap_economics::{EntityId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REWARD_ICON: &str = "🎁";
pub const REDEMPTION_CODE_PREFIX: &str = "ECO-";

/// Which catalog owns an item's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    Curated,
    Partner,
}

/// Redeemable item as shown to users, whichever catalog it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardItem {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points_required: u64,
    pub stock: u64,
    pub icon: String,
    pub partner_name: String,
    pub source_catalog: CatalogSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<UserId>,
}

impl RewardItem {
    pub fn curated(name: impl Into<String>, points_required: u64, stock: u64) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.into(),
            description: String::new(),
            points_required,
            stock,
            icon: DEFAULT_REWARD_ICON.to_string(),
            partner_name: "EcoMap".to_string(),
            source_catalog: CatalogSource::Curated,
            partner_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Food,
    Drink,
    Merchandise,
    Service,
    General,
    Other,
    #[serde(other)]
    Unknown,
}

impl ProductCategory {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Food => "🍔",
            Self::Drink => "🥤",
            Self::Merchandise => "👕",
            Self::Service => "🛠️",
            Self::Other => "📦",
            Self::General | Self::Unknown => DEFAULT_REWARD_ICON,
        }
    }
}

/// Partner-listed product. Only those with a points price are redeemable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductItem {
    pub id: EntityId,
    pub partner_id: UserId,
    pub partner_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Cash price in PHP.
    pub price: Decimal,
    pub points_price: u64,
    pub category: ProductCategory,
    pub stock: u64,
    pub created_at: DateTime<Utc>,
}

impl ProductItem {
    pub fn is_redeemable(&self) -> bool {
        self.points_price > 0
    }

    pub fn to_reward(&self) -> RewardItem {
        RewardItem {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            points_required: self.points_price,
            stock: self.stock,
            icon: self.category.icon().to_string(),
            partner_name: self.partner_name.clone(),
            source_catalog: CatalogSource::Partner,
            partner_id: Some(self.partner_id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: EntityId,
    pub user_id: UserId,
    pub item_id: EntityId,
    pub item_name: String,
    pub source_catalog: CatalogSource,
    pub points_spent: u64,
    pub code: String,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
}

impl Redemption {
    /// `ECO-` followed by six random uppercase hex characters.
    pub fn generate_code() -> String {
        let bytes: [u8; 3] = rand::random();
        format!("{}{}", REDEMPTION_CODE_PREFIX, hex::encode_upper(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    pub redemption_id: EntityId,
    pub code: String,
    pub status: RedemptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Segregation,
    Cleanup,
    Hauling,
}

/// Inbound job posting request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRequest {
    pub posted_by: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub job_type: JobType,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub geo: Option<GeoPoint>,
    /// Falls back to the configured per-post fee.
    #[serde(default)]
    pub credits_cost: Option<u64>,
    pub token_reward: u64,
}

impl JobRequest {
    pub fn new(posted_by: UserId, title: impl Into<String>, token_reward: u64) -> Self {
        Self {
            posted_by,
            title: title.into(),
            description: String::new(),
            job_type: JobType::Cleanup,
            location: String::new(),
            geo: None,
            credits_cost: None,
            token_reward,
        }
    }

    pub fn with_credits_cost(mut self, credits_cost: u64) -> Self {
        self.credits_cost = Some(credits_cost);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer_id: UserId,
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: EntityId,
    pub posted_by: UserId,
    pub title: String,
    pub description: String,
    pub job_type: JobType,
    pub location: String,
    pub geo: Option<GeoPoint>,
    /// Held amounts; refunds use these, never recomputed values.
    pub credits_cost: u64,
    pub token_reward: u64,
    pub approval_status: ApprovalStatus,
    pub status: JobStatus,
    pub review: Option<Review>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WasteType {
    Plastic,
    Biodegradable,
    Hazardous,
    EWaste,
    Metal,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Inbound report submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub user_id: UserId,
    pub location: GeoPoint,
    #[serde(default)]
    pub trash_count: Option<u32>,
    pub waste_type: WasteType,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
}

impl ReportRequest {
    pub fn new(user_id: UserId, lat: f64, lng: f64) -> Self {
        Self {
            user_id,
            location: GeoPoint::new(lat, lng),
            trash_count: None,
            waste_type: WasteType::Mixed,
            severity: Severity::Medium,
            description: String::new(),
        }
    }

    pub fn with_trash_count(mut self, trash_count: u32) -> Self {
        self.trash_count = Some(trash_count);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cleanup {
    pub cleaned_by: UserId,
    pub cleanup_image_url: String,
    pub cleaned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: EntityId,
    pub user_id: UserId,
    pub location: GeoPoint,
    pub trash_count: u32,
    pub waste_type: WasteType,
    pub severity: Severity,
    pub description: String,
    pub status: ReportStatus,
    pub cleanup: Option<Cleanup>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redemption_code_format() {
        let code = Redemption::generate_code();
        assert_eq!(code.len(), REDEMPTION_CODE_PREFIX.len() + 6);
        let suffix = &code[REDEMPTION_CODE_PREFIX.len()..];
        assert!(code.starts_with(REDEMPTION_CODE_PREFIX));
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_job_request_rejects_unknown_or_missing_fields() {
        let parsed: JobRequest = serde_json::from_str(
            r#"{"posted_by":"u1","title":"Creek","job_type":"cleanup","token_reward":5}"#,
        )
        .unwrap();
        assert_eq!(parsed.token_reward, 5);
        assert_eq!(parsed.credits_cost, None);

        // Misspelled reward field.
        assert!(serde_json::from_str::<JobRequest>(
            r#"{"posted_by":"u1","title":"Creek","job_type":"cleanup","tokenReward":5}"#
        )
        .is_err());
        assert!(serde_json::from_str::<JobRequest>(
            r#"{"posted_by":"u1","title":"Creek","job_type":"cleanup","token_reward":5,"bogus":1}"#
        )
        .is_err());
    }

    #[test]
    fn test_report_request_rejects_unknown_fields() {
        let parsed: ReportRequest = serde_json::from_str(
            r#"{"user_id":"u1","location":{"lat":10.3,"lng":123.9},"trash_count":4,
                "waste_type":"plastic","severity":"high"}"#,
        )
        .unwrap();
        assert_eq!(parsed.trash_count, Some(4));

        assert!(serde_json::from_str::<ReportRequest>(
            r#"{"user_id":"u1","location":{"lat":10.3,"lng":123.9},"trashCount":4,
                "waste_type":"plastic","severity":"high"}"#
        )
        .is_err());
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let category: ProductCategory = serde_json::from_str("\"toys\"").unwrap();
        assert_eq!(category, ProductCategory::Unknown);
        assert_eq!(category.icon(), DEFAULT_REWARD_ICON);
        assert_eq!(ProductCategory::Drink.icon(), "🥤");
    }

    #[test]
    fn test_product_maps_to_reward_shape() {
        let product = ProductItem {
            id: EntityId::from("p1"),
            partner_id: EntityId::from("partner"),
            partner_name: "Sari-Sari Store".to_string(),
            name: "Rice 1kg".to_string(),
            description: String::new(),
            price: Decimal::new(6000, 2),
            points_price: 150,
            category: ProductCategory::Food,
            stock: 4,
            created_at: Utc::now(),
        };
        let reward = product.to_reward();
        assert_eq!(reward.points_required, 150);
        assert_eq!(reward.source_catalog, CatalogSource::Partner);
        assert_eq!(reward.partner_id, Some(EntityId::from("partner")));
        assert_eq!(reward.icon, "🍔");
    }
}
