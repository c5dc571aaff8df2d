//! Marketing guidance keyed by segment name

use crate::naming::{AT_RISK, NEW, OCCASIONAL, REGULAR, VIP};
use serde::{Deserialize, Serialize};

/// Free-text campaign attributes for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecommendation {
    pub email_frequency: String,
    pub offer_type: String,
    pub message_tone: String,
    pub strategy: String,
}

impl SegmentRecommendation {
    fn new(email_frequency: &str, offer_type: &str, message_tone: &str, strategy: &str) -> Self {
        Self {
            email_frequency: email_frequency.to_string(),
            offer_type: offer_type.to_string(),
            message_tone: message_tone.to_string(),
            strategy: strategy.to_string(),
        }
    }
}

/// Look up the recommendation for a segment name.
///
/// Names outside the five primary categories share a generic promotional plan.
pub fn recommendation_for(segment_name: &str) -> SegmentRecommendation {
    match segment_name {
        VIP => SegmentRecommendation::new(
            "Monthly",
            "Exclusive VIP offers, early access to new products, personalized recommendations",
            "Premium, personalized, appreciative",
            "Retention and loyalty building, encourage referrals",
        ),
        AT_RISK => SegmentRecommendation::new(
            "Bi-weekly",
            "Win-back offers, special discounts, reminders of past purchases",
            "We miss you, incentivizing",
            "Re-engagement, remind of value proposition",
        ),
        NEW => SegmentRecommendation::new(
            "Weekly for first month, then bi-weekly",
            "Welcome offers, educational content about products/services",
            "Welcoming, helpful, educational",
            "Onboarding, build relationship, encourage second purchase",
        ),
        REGULAR => SegmentRecommendation::new(
            "Bi-weekly",
            "Loyalty rewards, cross-sell related products",
            "Friendly, appreciative",
            "Increase purchase frequency, encourage category exploration",
        ),
        OCCASIONAL => SegmentRecommendation::new(
            "Monthly",
            "Seasonal promotions, category-specific offers",
            "Promotional, highlighting value",
            "Increase purchase frequency, highlight value proposition",
        ),
        _ => SegmentRecommendation::new(
            "Monthly",
            "General promotions, seasonal offers",
            "Promotional",
            "Segment-specific strategy based on characteristics",
        ),
    }
}
