use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::interaction::{Channel, SellerId};

/// Fixed intent taxonomy produced by the draft generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Thanks,
    PositiveFeedback,
    ProductQuestion,
    SizeFit,
    Delivery,
    Availability,
    Packaging,
    Price,
    Defect,
    WrongItem,
    QualityComplaint,
    Unclassified,
}

impl Intent {
    /// Intents that are never answered automatically, whatever the seller configures.
    pub const ALWAYS_BLOCKED: [Intent; 3] =
        [Intent::Defect, Intent::WrongItem, Intent::QualityComplaint];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thanks => "thanks",
            Self::PositiveFeedback => "positive_feedback",
            Self::ProductQuestion => "product_question",
            Self::SizeFit => "size_fit",
            Self::Delivery => "delivery",
            Self::Availability => "availability",
            Self::Packaging => "packaging",
            Self::Price => "price",
            Self::Defect => "defect",
            Self::WrongItem => "wrong_item",
            Self::QualityComplaint => "quality_complaint",
            Self::Unclassified => "unclassified",
        }
    }

    /// Unknown labels map to `Unclassified` rather than failing.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "thanks" => Self::Thanks,
            "positive_feedback" => Self::PositiveFeedback,
            "product_question" => Self::ProductQuestion,
            "size_fit" => Self::SizeFit,
            "delivery" => Self::Delivery,
            "availability" => Self::Availability,
            "packaging" => Self::Packaging,
            "price" => Self::Price,
            "defect" => Self::Defect,
            "wrong_item" => Self::WrongItem,
            "quality_complaint" => Self::QualityComplaint,
            _ => Self::Unclassified,
        }
    }

    pub fn is_always_blocked(&self) -> bool {
        Self::ALWAYS_BLOCKED.contains(self)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioAction {
    Auto,
    Draft,
    Block,
}

impl ScenarioAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Draft => "draft",
            Self::Block => "block",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub action: ScenarioAction,
    pub channels: BTreeSet<Channel>,
    pub enabled: bool,
}

/// Normalized per-seller auto-response settings, read-only during a pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSettings {
    pub seller_id: SellerId,
    pub enabled: bool,
    pub allowed_channels: BTreeSet<Channel>,
    /// Empty means every product is in scope.
    pub product_whitelist: BTreeSet<String>,
    pub scenarios: BTreeMap<Intent, ScenarioConfig>,
    pub promo_opt_in: bool,
}

impl SellerSettings {
    pub fn disabled(seller_id: SellerId) -> Self {
        Self {
            seller_id,
            enabled: false,
            allowed_channels: BTreeSet::new(),
            product_whitelist: BTreeSet::new(),
            scenarios: BTreeMap::new(),
            promo_opt_in: false,
        }
    }

    pub fn allows_channel(&self, channel: Channel) -> bool {
        self.allowed_channels.contains(&channel)
    }

    pub fn product_in_scope(&self, product_id: Option<&str>) -> bool {
        if self.product_whitelist.is_empty() {
            return true;
        }
        product_id.is_some_and(|product_id| self.product_whitelist.contains(product_id))
    }

    /// Identifies the policy version and settings a decision was made under.
    ///
    /// Any settings change yields a new scope, so interactions decided under the old settings
    /// become eligible again.
    pub fn decision_scope(&self, policy_version: &str) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(&encoded));
        format!("{policy_version}:{}", &digest[..16])
    }
}

/// Stored settings shape. Older sellers only carry a flat list of auto-reply intents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SellerSettingsDocument {
    Structured {
        enabled: bool,
        allowed_channels: BTreeSet<Channel>,
        #[serde(default)]
        product_whitelist: BTreeSet<String>,
        scenarios: BTreeMap<Intent, ScenarioConfig>,
        #[serde(default)]
        promo_opt_in: bool,
    },
    Legacy {
        enabled: bool,
        allowed_channels: BTreeSet<Channel>,
        #[serde(default)]
        product_whitelist: BTreeSet<String>,
        auto_reply_intents: Vec<Intent>,
        #[serde(default)]
        promo_opt_in: bool,
    },
}

impl SellerSettingsDocument {
    /// Converts the stored document into structured settings.
    ///
    /// Legacy allow-lists become `auto` scenarios over the seller's allowed channels, and the
    /// always-blocked intents are materialized as `block` entries.
    pub fn into_settings(self, seller_id: SellerId) -> SellerSettings {
        match self {
            Self::Structured {
                enabled,
                allowed_channels,
                product_whitelist,
                scenarios,
                promo_opt_in,
            } => SellerSettings {
                seller_id,
                enabled,
                allowed_channels,
                product_whitelist,
                scenarios,
                promo_opt_in,
            },
            Self::Legacy {
                enabled,
                allowed_channels,
                product_whitelist,
                auto_reply_intents,
                promo_opt_in,
            } => {
                let scenarios = migrate_legacy_intents(&auto_reply_intents, &allowed_channels);
                SellerSettings {
                    seller_id,
                    enabled,
                    allowed_channels,
                    product_whitelist,
                    scenarios,
                    promo_opt_in,
                }
            }
        }
    }
}

pub fn migrate_legacy_intents(
    intents: &[Intent],
    channels: &BTreeSet<Channel>,
) -> BTreeMap<Intent, ScenarioConfig> {
    let mut scenarios = BTreeMap::new();

    for intent in intents {
        scenarios.insert(
            *intent,
            ScenarioConfig { action: ScenarioAction::Auto, channels: channels.clone(), enabled: true },
        );
    }

    for intent in Intent::ALWAYS_BLOCKED {
        scenarios.insert(
            intent,
            ScenarioConfig {
                action: ScenarioAction::Block,
                channels: channels.clone(),
                enabled: true,
            },
        );
    }

    scenarios
}
