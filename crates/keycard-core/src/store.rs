//! The `MembershipStore` trait and its outcome types.
//!
//! The trait is implemented by storage backends (e.g. `keycard-store-sqlite`).
//! The services in this crate and the HTTP layer depend on this abstraction,
//! not on any concrete backend.
//!
//! Expected business outcomes (a taken serial, a stale promotion counter) are
//! returned as values, not errors, so callers can retry without string
//! matching on backend messages. `Self::Error` is reserved for the store
//! itself failing.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Percent,
  audit::{DiscountChange, NewScanEvent, Requester, ScanEvent},
  holder::{Holder, HolderUpdate, NewHolder},
  promotion::{NewPromotion, PromotionCode, PromotionRedemption, PromotionUsage},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`MembershipStore::insert_holder`].
#[derive(Debug, Clone)]
pub enum InsertHolder {
  Inserted {
    holder: Holder,
    /// Present when a redemption was committed alongside the holder.
    usage:  Option<PromotionUsage>,
  },
  /// The unique email constraint fired. Nothing was written.
  EmailTaken,
  /// The unique serial constraint fired. Nothing was written.
  SerialTaken,
  /// The promotion counter moved since the claim was read, or the promotion
  /// stopped being redeemable. Nothing was written.
  PromotionStale,
}

/// Result of [`MembershipStore::try_consume_promotion`].
#[derive(Debug, Clone)]
pub enum ConsumePromotion {
  Consumed(PromotionUsage),
  /// The conditional increment matched no row. Nothing was written.
  Stale,
}

/// Result of [`MembershipStore::insert_promotion`].
#[derive(Debug, Clone)]
pub enum InsertPromotion {
  Inserted(PromotionCode),
  CodeTaken,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Keycard persistence backend.
///
/// Implementations must guarantee:
///
/// - unique holder email (case-insensitive) and unique holder serial,
///   reported as [`InsertHolder::EmailTaken`] / [`InsertHolder::SerialTaken`];
/// - promotion counters advanced only through a single conditional update
///   keyed on the previously read counter;
/// - each multi-row write (holder plus redemption, discount plus change
///   event) committed atomically.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MembershipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Holders ───────────────────────────────────────────────────────────

  /// Case-insensitive lookup by email.
  fn find_holder_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<Holder>, Self::Error>> + Send + '_;

  fn find_holder_by_serial(
    &self,
    serial: String,
  ) -> impl Future<Output = Result<Option<Holder>, Self::Error>> + Send + '_;

  /// Whether any holder already carries `serial`.
  fn serial_taken(
    &self,
    serial: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Persist a holder, optionally redeeming a promotion in the same
  /// transaction.
  ///
  /// When `redemption` is given the promotion counter is advanced with the
  /// same conditional update as [`Self::try_consume_promotion`], and the
  /// usage record carries the new holder's id. Any conflict rolls back the
  /// whole write.
  fn insert_holder(
    &self,
    input: NewHolder,
    redemption: Option<PromotionRedemption>,
  ) -> impl Future<Output = Result<InsertHolder, Self::Error>> + Send + '_;

  /// All holders, newest first.
  fn list_holders(
    &self,
  ) -> impl Future<Output = Result<Vec<Holder>, Self::Error>> + Send + '_;

  /// Set the pass-delivered flag. Returns `false` if the holder is unknown.
  fn mark_delivered(
    &self,
    holder_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Apply `update` to one holder and return the updated record. A discount
  /// that actually changes appends a [`DiscountChange`] in the same
  /// transaction. Returns `None` (and writes nothing) if the holder is
  /// unknown.
  fn update_holder(
    &self,
    holder_id: Uuid,
    update: HolderUpdate,
    requester: Requester,
  ) -> impl Future<Output = Result<Option<Holder>, Self::Error>> + Send + '_;

  // ── Promotions ────────────────────────────────────────────────────────

  /// Exact lookup; `code` must already be normalised.
  fn find_promotion(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<PromotionCode>, Self::Error>> + Send + '_;

  /// All promotion codes, newest first.
  fn list_promotions(
    &self,
  ) -> impl Future<Output = Result<Vec<PromotionCode>, Self::Error>> + Send + '_;

  /// Persist a promotion with zero uses, active. `input.code` is stored
  /// verbatim; [`crate::resolver::create_promotion`] normalises it first.
  fn insert_promotion(
    &self,
    input: NewPromotion,
  ) -> impl Future<Output = Result<InsertPromotion, Self::Error>> + Send + '_;

  /// Insert `seeds` only if the promotion table is empty. Returns the number
  /// of rows inserted.
  fn seed_promotions(
    &self,
    seeds: Vec<NewPromotion>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Toggle the active flag. Returns `None` if the promotion is unknown.
  fn set_promotion_active(
    &self,
    promo_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Option<PromotionCode>, Self::Error>> + Send + '_;

  /// Advance the counter by one if it still equals
  /// `redemption.claim.expected_uses` and the promotion is still redeemable
  /// at `redemption.at`, appending a usage record in the same transaction.
  fn try_consume_promotion(
    &self,
    redemption: PromotionRedemption,
  ) -> impl Future<Output = Result<ConsumePromotion, Self::Error>> + Send + '_;

  /// Usage records for one promotion, oldest first.
  fn list_promotion_usage(
    &self,
    promo_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PromotionUsage>, Self::Error>> + Send + '_;

  // ── Scans and overrides ───────────────────────────────────────────────

  fn record_scan(
    &self,
    event: NewScanEvent,
  ) -> impl Future<Output = Result<ScanEvent, Self::Error>> + Send + '_;

  /// Scan events for a serial, oldest first.
  fn list_scans(
    &self,
    serial: String,
  ) -> impl Future<Output = Result<Vec<ScanEvent>, Self::Error>> + Send + '_;

  /// Replace the discount of the holder carrying `serial` and append a
  /// [`DiscountChange`] in the same transaction. Returns `None` (and writes
  /// nothing) if no holder carries `serial`.
  fn update_discount(
    &self,
    serial: String,
    new_discount: Percent,
    requester: Requester,
  ) -> impl Future<Output = Result<Option<DiscountChange>, Self::Error>> + Send + '_;

  /// Discount changes for one holder, oldest first.
  fn list_discount_changes(
    &self,
    holder_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DiscountChange>, Self::Error>> + Send + '_;
}
