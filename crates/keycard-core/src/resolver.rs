//! Promotion resolution: validation, race-free consumption, administration.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::Requester,
  promotion::{
    NewPromotion, PromotionCode, PromotionRedemption, PromotionUsage,
    default_promotions, normalize_code,
  },
  store::{ConsumePromotion, InsertPromotion, MembershipStore},
};

/// Look up `code` and return it only if it is currently redeemable.
pub async fn validate<S>(store: &S, code: &str) -> Result<Option<PromotionCode>>
where
  S: MembershipStore,
{
  validate_at(store, code, Utc::now()).await
}

/// [`validate`] against an explicit clock.
pub async fn validate_at<S>(
  store: &S,
  code: &str,
  now: DateTime<Utc>,
) -> Result<Option<PromotionCode>>
where
  S: MembershipStore,
{
  let code = normalize_code(code);
  if code.is_empty() {
    return Ok(None);
  }
  let promo = store.find_promotion(code).await.map_err(Error::store)?;
  Ok(promo.filter(|p| p.is_redeemable(now)))
}

/// Redeem one use of `code`.
///
/// Returns `None` without side effects when the code is unknown or not
/// redeemable. A lost race against a concurrent redemption is retried from a
/// fresh read for as long as the code stays redeemable, so two consumers can
/// never both take the last slot and no consumer gives up while uses remain.
/// Every lost race is another caller's successful redemption, which bounds
/// the retries by the cap or by the number of concurrent callers.
pub async fn consume<S>(
  store: &S,
  code: &str,
  requester: &Requester,
) -> Result<Option<PromotionUsage>>
where
  S: MembershipStore,
{
  let mut attempt = 0usize;
  loop {
    attempt += 1;
    let now = Utc::now();
    let Some(promo) = validate_at(store, code, now).await? else {
      return Ok(None);
    };

    let redemption = PromotionRedemption {
      claim:     promo.claim(),
      requester: requester.clone(),
      at:        now,
    };
    match store
      .try_consume_promotion(redemption)
      .await
      .map_err(Error::store)?
    {
      ConsumePromotion::Consumed(usage) => {
        info!(code = %usage.code, discount = %usage.discount_pct, "promotion redeemed");
        return Ok(Some(usage));
      }
      ConsumePromotion::Stale => {
        debug!(code = %promo.code, attempt, "promotion counter moved; re-reading");
      }
    }
  }
}

/// Validate and persist a new promotion code.
pub async fn create_promotion<S>(
  store: &S,
  input: NewPromotion,
) -> Result<PromotionCode>
where
  S: MembershipStore,
{
  let (code, pct) = input.validate()?;
  let normalized = NewPromotion {
    code: code.clone(),
    description: input.description.trim().to_owned(),
    discount_pct: i64::from(pct.get()),
    ..input
  };
  match store
    .insert_promotion(normalized)
    .await
    .map_err(Error::store)?
  {
    InsertPromotion::Inserted(promo) => {
      info!(code = %promo.code, created_by = %promo.created_by, "promotion created");
      Ok(promo)
    }
    InsertPromotion::CodeTaken => Err(Error::DuplicatePromotion(code)),
  }
}

/// Activate or deactivate a promotion.
pub async fn set_active<S>(
  store: &S,
  promo_id: Uuid,
  active: bool,
) -> Result<PromotionCode>
where
  S: MembershipStore,
{
  let promo = store
    .set_promotion_active(promo_id, active)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::PromotionNotFound(promo_id.to_string()))?;
  info!(code = %promo.code, active, "promotion toggled");
  Ok(promo)
}

/// Seed the default promotion codes into an empty store.
pub async fn seed_defaults<S>(store: &S) -> Result<usize>
where
  S: MembershipStore,
{
  let inserted = store
    .seed_promotions(default_promotions(Utc::now()))
    .await
    .map_err(Error::store)?;
  if inserted > 0 {
    info!(inserted, "seeded default promotion codes");
  }
  Ok(inserted)
}
