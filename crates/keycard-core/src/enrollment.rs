//! Enrollment: discount resolution, serial allocation, holder persistence.
//!
//! The caller never supplies a discount. A promotion code, if given, is
//! resolved server-side; when it cannot be honoured the holder is enrolled at
//! the policy default instead of failing the request.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  Error, Percent, Result,
  audit::Requester,
  holder::{Holder, NewHolder, normalize_email, normalize_optional},
  promotion::{PromotionClaim, PromotionRedemption, normalize_code},
  resolver,
  serial::SerialSource,
  store::{InsertHolder, MembershipStore},
};

/// Upper bound on serial draws for one enrollment, counting both draws the
/// store reported as taken and inserts rejected by the unique constraint.
pub const MAX_SERIAL_ATTEMPTS: usize = 20;

/// Discount applied when no promotion is honoured, unless configured.
pub const DEFAULT_DISCOUNT: Percent = Percent::saturating(5);

/// Knobs the enrollment flow takes from configuration.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentPolicy {
  pub default_discount: Percent,
}

impl Default for EnrollmentPolicy {
  fn default() -> Self {
    Self { default_discount: DEFAULT_DISCOUNT }
  }
}

/// What a prospective holder submits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentRequest {
  pub email:      String,
  pub name:       Option<String>,
  pub phone:      Option<String>,
  pub promo_code: Option<String>,
}

/// A successful enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
  pub holder:        Holder,
  /// The promotion code that set the discount, if any.
  pub applied_promo: Option<String>,
}

/// Enroll a new holder.
///
/// Fails with [`Error::DuplicateEmail`] if the email is already enrolled
/// (including when a concurrent enrollment wins the race), and with
/// [`Error::SerialExhausted`] after [`MAX_SERIAL_ATTEMPTS`] colliding draws.
/// Nothing is persisted on any failure path: the holder row and the
/// promotion redemption are committed together or not at all.
pub async fn enroll<S, G>(
  store: &S,
  serials: &G,
  policy: &EnrollmentPolicy,
  request: EnrollmentRequest,
  requester: &Requester,
) -> Result<Enrollment>
where
  S: MembershipStore,
  G: SerialSource + ?Sized,
{
  let email = normalize_email(&request.email)?;
  let name = normalize_optional(request.name.as_deref());
  let phone = normalize_optional(request.phone.as_deref());

  if store
    .find_holder_by_email(email.clone())
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::DuplicateEmail(email));
  }

  let code = request
    .promo_code
    .as_deref()
    .map(normalize_code)
    .filter(|c| !c.is_empty());
  let mut claim = match &code {
    Some(code) => claim_promotion(store, code).await?,
    None => None,
  };

  let mut serial_attempts = 0;
  let mut serial = allocate_serial(store, serials, &mut serial_attempts).await?;

  loop {
    let discount_pct = claim
      .as_ref()
      .map_or(policy.default_discount, |c| c.discount_pct);
    let input = NewHolder {
      email: email.clone(),
      name: name.clone(),
      phone: phone.clone(),
      discount_pct,
      pass_serial: serial.clone(),
    };
    let redemption = claim.clone().map(|claim| PromotionRedemption {
      claim,
      requester: requester.clone(),
      at: Utc::now(),
    });

    match store
      .insert_holder(input, redemption)
      .await
      .map_err(Error::store)?
    {
      InsertHolder::Inserted { holder, usage } => {
        let applied_promo = usage.map(|u| u.code);
        info!(
          holder_id = %holder.holder_id,
          discount = %holder.discount_pct,
          promo = applied_promo.as_deref().unwrap_or("-"),
          "holder enrolled"
        );
        return Ok(Enrollment { holder, applied_promo });
      }
      InsertHolder::EmailTaken => return Err(Error::DuplicateEmail(email)),
      InsertHolder::SerialTaken => {
        warn!(attempt = serial_attempts, "serial collided on insert; redrawing");
        serial = allocate_serial(store, serials, &mut serial_attempts).await?;
      }
      // Another redemption moved the counter. Re-read and retry for as long
      // as the code is still redeemable; fall back only once it is not.
      InsertHolder::PromotionStale => {
        claim = match &code {
          Some(code) => claim_promotion(store, code).await?,
          None => None,
        };
        if claim.is_none() {
          warn!(
            code = code.as_deref().unwrap_or("-"),
            "promotion no longer redeemable; enrolling at default discount"
          );
        }
      }
    }
  }
}

async fn claim_promotion<S>(store: &S, code: &str) -> Result<Option<PromotionClaim>>
where
  S: MembershipStore,
{
  Ok(resolver::validate(store, code).await?.map(|p| p.claim()))
}

/// Draw serials until one is not already taken, charging each draw to
/// `attempts`.
async fn allocate_serial<S, G>(
  store: &S,
  serials: &G,
  attempts: &mut usize,
) -> Result<String>
where
  S: MembershipStore,
  G: SerialSource + ?Sized,
{
  while *attempts < MAX_SERIAL_ATTEMPTS {
    *attempts += 1;
    let candidate = serials.draw();
    if !store
      .serial_taken(candidate.clone())
      .await
      .map_err(Error::store)?
    {
      return Ok(candidate);
    }
    warn!(attempt = *attempts, "drew a serial that is already taken");
  }
  Err(Error::SerialExhausted(MAX_SERIAL_ATTEMPTS))
}
