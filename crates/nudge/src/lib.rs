//! # Churn Platform Nudge Engine
//!
//! The nudge rule table and matcher (C5), and the action executors (C6):
//! coupon assignment, LLM-based message generation, and persistence of
//! nudges/coupons/messages.

pub mod coupons;
pub mod engine;
pub mod messages;
pub mod persistence;
pub mod rules;

pub use coupons::{assign_discount_coupon, build_catalog_coupon, select_coupon, Coupon, CouponSource, DiscountType, UserCoupon, UserCouponStatus};
pub use engine::{NudgeEngine, NudgeOutcome, TriggeredNudge};
pub use messages::{MessageContext, MessageGenerator, StoredMessage};
pub use persistence::NudgeRecord;
pub use rules::{find_matching_rule, NudgeAction, NudgeRule, NUDGE_RULES};
