use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealType {
    RoomDiscount,
    FreeDining,
    RoomUpgrade,
    PackageDiscount,
    FreeNights,
    PassholderExclusive,
    Other,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::RoomDiscount => "room_discount",
            DealType::FreeDining => "free_dining",
            DealType::RoomUpgrade => "room_upgrade",
            DealType::PackageDiscount => "package_discount",
            DealType::FreeNights => "free_nights",
            DealType::PassholderExclusive => "passholder_exclusive",
            DealType::Other => "other",
        }
    }
}

impl fmt::Display for DealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "room_discount" => Ok(DealType::RoomDiscount),
            "free_dining" => Ok(DealType::FreeDining),
            "room_upgrade" => Ok(DealType::RoomUpgrade),
            "package_discount" => Ok(DealType::PackageDiscount),
            "free_nights" => Ok(DealType::FreeNights),
            "passholder_exclusive" => Ok(DealType::PassholderExclusive),
            "other" => Ok(DealType::Other),
            _ => anyhow::bail!("Unknown deal type: {}", s),
        }
    }
}

/// A rule fires when every term of any one of its alternatives is present.
struct Rule {
    deal_type: DealType,
    any_of: &'static [&'static [&'static str]],
}

impl Rule {
    fn matches(&self, text: &str) -> bool {
        self.any_of
            .iter()
            .any(|terms| terms.iter().all(|term| text.contains(term)))
    }
}

// Order matters: text regularly mentions several of these at once.
const RULES: &[Rule] = &[
    Rule {
        deal_type: DealType::FreeDining,
        any_of: &[&["free dining"]],
    },
    Rule {
        deal_type: DealType::RoomDiscount,
        any_of: &[
            &["room discount"],
            &["room rate"],
            &["resort discount"],
            &["room", "discount"],
            &["room", "rate"],
        ],
    },
    Rule {
        deal_type: DealType::PackageDiscount,
        any_of: &[&["package"]],
    },
    Rule {
        deal_type: DealType::PassholderExclusive,
        any_of: &[&["passholder"], &["annual pass"], &[" ap "]],
    },
    Rule {
        deal_type: DealType::RoomUpgrade,
        any_of: &[&["upgrade"]],
    },
    Rule {
        deal_type: DealType::FreeNights,
        any_of: &[&["free night"], &["complimentary night"]],
    },
];

/// Classify deal text, first matching rule wins
pub fn classify(text: &str) -> DealType {
    // Pad so that short tokens like "ap" can be matched as whole words at either end
    let padded = format!(" {} ", text.to_lowercase());

    RULES
        .iter()
        .find(|rule| rule.matches(&padded))
        .map(|rule| rule.deal_type)
        .unwrap_or(DealType::Other)
}
