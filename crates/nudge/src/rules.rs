//! The nudge rule table and matching algorithm: ordered rules over
//! (score range x reason set), with substring and semantic reason
//! matching and a fixed priority order.

use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NudgeAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub content_template: String,
    pub channel: String,
    pub priority: u32,
    #[serde(default)]
    pub discount_percent: Option<u32>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NudgeRule {
    pub rule_id: &'static str,
    pub churn_score_range: (f64, f64),
    pub churn_reasons: &'static [&'static str],
    pub nudges: Vec<NudgeAction>,
}

fn action(action_type: &str, content_template: &str, channel: &str, priority: u32) -> NudgeAction {
    NudgeAction {
        action_type: action_type.to_string(),
        content_template: content_template.to_string(),
        channel: channel.to_string(),
        priority,
        discount_percent: None,
        coupon_code: None,
    }
}

/// A "Discount Coupon" nudge whose actual coupon is resolved dynamically
/// at execution time by [`crate::coupons::select_coupon`] rather than
/// pinned in the rule table.
fn dynamic_coupon_action(content_template: &str, channel: &str, priority: u32) -> NudgeAction {
    action("Discount Coupon", content_template, channel, priority)
}

/// A "Discount Coupon" nudge with a coupon pinned directly in the rule
/// (only `high_risk_inactive_user` does this in the source table).
fn fixed_coupon_action(content_template: &str, channel: &str, priority: u32, discount_percent: u32, coupon_code: &str) -> NudgeAction {
    NudgeAction {
        discount_percent: Some(discount_percent),
        coupon_code: Some(coupon_code.to_string()),
        ..action("Discount Coupon", content_template, channel, priority)
    }
}

/// The 11 rules, verbatim, in source-table order — priority ordering is
/// computed separately by [`priority_key`], not by reordering this table.
pub static NUDGE_RULES: Lazy<Vec<NudgeRule>> = Lazy::new(|| {
    vec![
        NudgeRule {
            rule_id: "high_risk_inactive_user",
            churn_score_range: (0.7, 1.0),
            churn_reasons: &["Inactive", "No purchase", "High risk factor"],
            nudges: vec![
                action("Custom Message", "AI-Generated Personalized Message", "sms", 1),
                fixed_coupon_action("20% Off Welcome Back", "app", 2, 20, "WELCOME20"),
                action("Push Notification", "We miss you! Get 20% off your next order", "push", 3),
            ],
        },
        NudgeRule {
            rule_id: "low_risk_engagement",
            churn_score_range: (0.0, 0.4),
            churn_reasons: &[],
            nudges: vec![action("Custom Message", "AI-Generated Engagement Message", "sms", 1)],
        },
        NudgeRule {
            rule_id: "medium_risk_cart_abandonment",
            churn_score_range: (0.3, 0.6),
            churn_reasons: &["cart", "abandon"],
            nudges: vec![action("Custom Message", "AI-Generated Cart Reminder", "sms", 1)],
        },
        NudgeRule {
            rule_id: "rule_1",
            churn_score_range: (0.6, 0.8),
            churn_reasons: &["INACTIVITY", "DELIVERY_ISSUES"],
            nudges: vec![action("Email", "Template 1", "email", 1)],
        },
        NudgeRule {
            rule_id: "rule_2",
            churn_score_range: (0.8, 1.0),
            churn_reasons: &["CART_ABANDONMENT"],
            nudges: vec![
                action("Custom Message", "AI-Generated Cart Recovery Message", "sms", 1),
                action("Push Notification", "Template 2", "push", 2),
                dynamic_coupon_action("Template 2", "email", 3),
            ],
        },
        NudgeRule {
            rule_id: "rule_3",
            churn_score_range: (0.7, 0.9),
            churn_reasons: &["LOW_ENGAGEMENT"],
            nudges: vec![action("Email", "Template 3", "email", 1)],
        },
        NudgeRule {
            rule_id: "rule_4",
            churn_score_range: (0.6, 0.75),
            churn_reasons: &["PRICE_SENSITIVITY"],
            nudges: vec![dynamic_coupon_action("Template 4", "email", 1)],
        },
        NudgeRule {
            rule_id: "rule_5",
            churn_score_range: (0.85, 1.0),
            churn_reasons: &["PAYMENT_FAILURE"],
            nudges: vec![
                action("Push Notification", "Template 5", "push", 1),
                action("Email", "Template 5", "email", 2),
            ],
        },
        NudgeRule {
            rule_id: "rule_6",
            churn_score_range: (0.65, 0.8),
            churn_reasons: &["PRODUCT_AVAILABILITY"],
            nudges: vec![action("Push Notification", "Template 6", "push", 1)],
        },
        NudgeRule {
            rule_id: "rule_7",
            churn_score_range: (0.7, 0.9),
            churn_reasons: &["INACTIVITY"],
            nudges: vec![action("Push Notification", "Template 7", "push", 1)],
        },
        NudgeRule {
            rule_id: "rule_8",
            churn_score_range: (0.6, 0.8),
            churn_reasons: &["CART_ABANDONMENT", "LOW_ENGAGEMENT"],
            nudges: vec![
                action("Custom Message", "AI-Generated Cart Abandonment Message", "sms", 1),
                action("Email", "Template 8", "email", 2),
                dynamic_coupon_action("Template 8", "email", 3),
            ],
        },
        NudgeRule {
            rule_id: "rule_9",
            churn_score_range: (0.75, 0.95),
            churn_reasons: &["DELIVERY_ISSUES", "PRICE_SENSITIVITY"],
            nudges: vec![action("Push Notification", "Template 9", "push", 1)],
        },
        NudgeRule {
            rule_id: "rule_10",
            churn_score_range: (0.8, 1.0),
            churn_reasons: &["PAYMENT_FAILURE", "CART_ABANDONMENT"],
            nudges: vec![
                action("Push Notification", "Template 10", "push", 1),
                dynamic_coupon_action("Template 10", "email", 2),
                action("Email", "Template 10", "email", 3),
            ],
        },
    ]
});

/// Numeric-suffix-descending priority key: a bare `rule_N` sorts on `N`;
/// any rule without that prefix (the three named rules) ties at 999 and
/// keeps source-table order (Rust's sort is stable).
fn priority_key(rule_id: &str) -> i64 {
    rule_id
        .strip_prefix("rule_")
        .and_then(|suffix| suffix.parse::<i64>().ok())
        .unwrap_or(999)
}

fn reasons_semantically_match(rule_reason: &str, churn_reason: &str) -> bool {
    const SEMANTIC_MAPPINGS: &[(&str, &[&str])] = &[
        ("inactive", &["inactive", "inactivity", "no login", "not active"]),
        ("no purchase", &["no purchase", "no recent purchase", "purchase", "buying"]),
        ("high risk factor", &["high risk", "risk factor", "risk"]),
        ("cart abandonment", &["cart abandon", "abandonment", "cart"]),
        ("low engagement", &["engagement", "low engagement", "not engaged"]),
        ("delivery issues", &["delivery", "shipping", "fulfillment"]),
        ("price sensitivity", &["price", "cost", "expensive", "pricing"]),
        ("payment failure", &["payment", "billing", "card", "transaction"]),
    ];

    SEMANTIC_MAPPINGS.iter().any(|(_, synonyms)| {
        synonyms.iter().any(|s| rule_reason.contains(s)) && synonyms.iter().any(|s| churn_reason.contains(s))
    })
}

fn reason_matches(rule_reasons: &[&str], churn_reasons: &[String]) -> bool {
    if rule_reasons.is_empty() {
        return true;
    }
    for rule_reason in rule_reasons {
        let rule_reason_lower = rule_reason.to_lowercase();
        for churn_reason in churn_reasons {
            let churn_reason_lower = churn_reason.to_lowercase();
            if rule_reason_lower.contains(&churn_reason_lower)
                || churn_reason_lower.contains(&rule_reason_lower)
                || reasons_semantically_match(&rule_reason_lower, &churn_reason_lower)
            {
                return true;
            }
        }
    }
    false
}

/// Finds the first rule (by priority order) whose score range contains
/// `churn_probability` and whose reason list matches `churn_reasons`
/// (or is the catch-all empty list).
pub fn find_matching_rule(churn_probability: f64, churn_reasons: &[String]) -> Option<&'static NudgeRule> {
    let mut sorted: Vec<&NudgeRule> = NUDGE_RULES.iter().collect();
    sorted.sort_by(|a, b| priority_key(b.rule_id).cmp(&priority_key(a.rule_id)));

    sorted.into_iter().find(|rule| {
        let (min, max) = rule.churn_score_range;
        (min..=max).contains(&churn_probability) && reason_matches(rule.churn_reasons, churn_reasons)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_sorts_rule_n_descending_then_named_rules() {
        let mut sorted: Vec<&str> = NUDGE_RULES.iter().map(|r| r.rule_id).collect();
        sorted.sort_by(|a, b| priority_key(b).cmp(&priority_key(a)));
        assert_eq!(
            sorted,
            vec![
                "high_risk_inactive_user",
                "low_risk_engagement",
                "medium_risk_cart_abandonment",
                "rule_10",
                "rule_9",
                "rule_8",
                "rule_7",
                "rule_6",
                "rule_5",
                "rule_4",
                "rule_3",
                "rule_2",
                "rule_1",
            ]
        );
    }

    #[test]
    fn substring_match_prefers_higher_priority_rule_with_same_range() {
        // rule_2 and rule_10 share the (0.8, 1.0) range and rule_10's reason
        // list also contains "CART_ABANDONMENT", so the higher-priority
        // rule_10 fires first.
        let rule = find_matching_rule(0.82, &["CART_ABANDONMENT".to_string()]).unwrap();
        assert_eq!(rule.rule_id, "rule_10");
    }

    #[test]
    fn catch_all_rule_matches_any_reason_in_its_range() {
        let rule = find_matching_rule(0.1, &["SOME_UNRELATED_REASON".to_string()]).unwrap();
        assert_eq!(rule.rule_id, "low_risk_engagement");
    }

    #[test]
    fn no_match_outside_every_range_returns_none() {
        assert!(find_matching_rule(-0.1, &[]).is_none());
    }

    #[test]
    fn semantic_match_connects_synonymous_reasons() {
        assert!(reasons_semantically_match("cart abandonment", "cart abandon detected"));
    }
}
