//! Promotion codes and their usage records.
//!
//! A promotion code grants a fixed discount to whoever redeems it while it is
//! active, unexpired, and under its usage cap. The usage counter is only
//! ever advanced by the store's conditional increment; see
//! [`crate::store::MembershipStore::try_consume_promotion`].

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Percent, Result, audit::Requester};

/// Longest code the store accepts.
pub const MAX_CODE_LEN: usize = 50;

/// Creator label used for seeded codes.
pub const SYSTEM_CREATOR: &str = "System";

// ─── PromotionCode ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCode {
  pub promo_id:     Uuid,
  /// Always upper-case.
  pub code:         String,
  pub description:  String,
  /// Between 1 and 100.
  pub discount_pct: Percent,
  /// `0` means unlimited.
  pub max_uses:     u32,
  pub current_uses: u32,
  pub active:       bool,
  pub expires_at:   Option<DateTime<Utc>>,
  pub created_by:   String,
  pub created_at:   DateTime<Utc>,
}

impl PromotionCode {
  /// The redeemability predicate: active, unexpired at `now`, and under the
  /// usage cap.
  pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
    self.active
      && self.expires_at.is_none_or(|exp| exp > now)
      && (self.max_uses == 0 || self.current_uses < self.max_uses)
  }

  /// Uses left before the cap is hit; `None` when unlimited.
  pub fn remaining_uses(&self) -> Option<u32> {
    (self.max_uses > 0).then(|| self.max_uses.saturating_sub(self.current_uses))
  }

  /// Snapshot the fields the conditional increment is keyed on.
  pub fn claim(&self) -> PromotionClaim {
    PromotionClaim {
      promo_id:      self.promo_id,
      code:          self.code.clone(),
      discount_pct:  self.discount_pct,
      expected_uses: self.current_uses,
    }
  }
}

/// A validated view of a promotion at the moment it was read.
///
/// The store only honours a claim whose `expected_uses` still matches the
/// stored counter; otherwise the claim is stale and must be re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionClaim {
  pub promo_id:      Uuid,
  pub code:          String,
  pub discount_pct:  Percent,
  pub expected_uses: u32,
}

/// A claim plus the audit context for the usage record it produces.
#[derive(Debug, Clone)]
pub struct PromotionRedemption {
  pub claim:     PromotionClaim,
  pub requester: Requester,
  /// Time used for the expiry re-check and the usage record.
  pub at:        DateTime<Utc>,
}

// ─── Usage ───────────────────────────────────────────────────────────────────

/// One successful redemption. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionUsage {
  pub usage_id:     Uuid,
  pub promo_id:     Uuid,
  /// The code as it was at redemption time.
  pub code:         String,
  pub discount_pct: Percent,
  /// The holder the discount was applied to, for enrollment redemptions.
  pub holder_id:    Option<Uuid>,
  pub used_at:      DateTime<Utc>,
  pub requester:    Requester,
}

// ─── NewPromotion ────────────────────────────────────────────────────────────

/// Input to [`crate::store::MembershipStore::insert_promotion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromotion {
  pub code:         String,
  #[serde(default)]
  pub description:  String,
  pub discount_pct: i64,
  #[serde(default)]
  pub max_uses:     u32,
  pub expires_at:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub created_by:   String,
}

impl NewPromotion {
  /// Normalise the code and check the discount range.
  ///
  /// Returns the normalised code and the validated discount.
  pub fn validate(&self) -> Result<(String, Percent)> {
    let code = normalize_code(&self.code);
    if code.is_empty() {
      return Err(Error::InvalidPromotion("code must not be empty".into()));
    }
    if code.len() > MAX_CODE_LEN {
      return Err(Error::InvalidPromotion(format!(
        "code is longer than {MAX_CODE_LEN} characters"
      )));
    }
    if !(1..=100).contains(&self.discount_pct) {
      return Err(Error::InvalidPromotion(format!(
        "discount {} is outside 1..=100",
        self.discount_pct
      )));
    }
    Ok((code, Percent::new(self.discount_pct)?))
  }
}

/// Codes are matched case-insensitively by storing them upper-case.
pub fn normalize_code(raw: &str) -> String { raw.trim().to_uppercase() }

/// The codes seeded into an empty promotion table.
pub fn default_promotions(now: DateTime<Utc>) -> Vec<NewPromotion> {
  let seed = |code: &str, description: &str, pct, max_uses, expires_at| {
    NewPromotion {
      code: code.into(),
      description: description.into(),
      discount_pct: pct,
      max_uses,
      expires_at,
      created_by: SYSTEM_CREATOR.into(),
    }
  };
  vec![
    seed("WELCOME10", "Welcome discount for new members", 10, 100, None),
    seed("VIP15", "VIP member special discount", 15, 50, None),
    seed("FRIEND20", "Friend referral bonus", 20, 200, None),
    seed(
      "SUMMER25",
      "Summer special promotion",
      25,
      0,
      now.checked_add_months(Months::new(3)),
    ),
  ]
}
