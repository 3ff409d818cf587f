//! Integration tests for `SqliteStore` against an in-memory database, driven
//! through the `keycard-core` services where the behaviour lives there.

use std::{collections::HashSet, sync::Mutex};

use chrono::{Duration, Utc};
use keycard_core::{
  Error as CoreError, Percent,
  audit::Requester,
  enrollment::{self, EnrollmentPolicy, EnrollmentRequest},
  holder::{self, HolderEdit, NewHolder},
  promotion::{NewPromotion, PromotionCode},
  resolver, scan,
  serial::{RandomSerials, SerialSource, is_well_formed},
  store::{InsertHolder, InsertPromotion, MembershipStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn requester() -> Requester {
  Requester {
    address:    Some("203.0.113.7".into()),
    user_agent: Some("test-agent/1.0".into()),
  }
}

fn request(email: &str, promo: Option<&str>) -> EnrollmentRequest {
  EnrollmentRequest {
    email:      email.into(),
    name:       Some("Ada Lovelace".into()),
    phone:      None,
    promo_code: promo.map(Into::into),
  }
}

async fn enroll(s: &SqliteStore, email: &str, promo: Option<&str>) -> enrollment::Enrollment {
  enrollment::enroll(
    s,
    &RandomSerials,
    &EnrollmentPolicy::default(),
    request(email, promo),
    &requester(),
  )
  .await
  .unwrap()
}

async fn promotion(s: &SqliteStore, code: &str, pct: i64, max_uses: u32) -> PromotionCode {
  resolver::create_promotion(s, NewPromotion {
    code: code.into(),
    description: String::new(),
    discount_pct: pct,
    max_uses,
    expires_at: None,
    created_by: "admin".into(),
  })
  .await
  .unwrap()
}

/// Hands out a fixed sequence of serials, then repeats the last one.
struct Scripted(Mutex<Vec<String>>);

impl Scripted {
  fn new(serials: &[&str]) -> Self {
    Self(Mutex::new(serials.iter().rev().map(|s| s.to_string()).collect()))
  }
}

impl SerialSource for Scripted {
  fn draw(&self) -> String {
    let mut left = self.0.lock().unwrap();
    if left.len() > 1 { left.pop().unwrap() } else { left[0].clone() }
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_migrates_to_latest() {
  let s = store().await;
  assert_eq!(s.schema_version().await.unwrap(), 1);
}

#[tokio::test]
async fn reopen_does_not_rerun_migrations() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("keycard.db");

  let s = SqliteStore::open(&path).await.unwrap();
  enroll(&s, "a@example.com", None).await;
  drop(s);

  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.list_holders().await.unwrap().len(), 1);
}

// ─── Holders ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_find_holder() {
  let s = store().await;
  let outcome = s
    .insert_holder(
      NewHolder {
        email:        "grace@example.com".into(),
        name:         Some("Grace".into()),
        phone:        Some("+1 555 0100".into()),
        discount_pct: Percent::new(5).unwrap(),
        pass_serial:  "ABCDEFabcdef".into(),
      },
      None,
    )
    .await
    .unwrap();
  let InsertHolder::Inserted { holder, usage } = outcome else {
    panic!("expected insert, got {outcome:?}");
  };
  assert!(usage.is_none());
  assert!(!holder.pass_delivered);

  let by_serial = s
    .find_holder_by_serial("ABCDEFabcdef".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(by_serial.holder_id, holder.holder_id);
  assert_eq!(by_serial.created_at, holder.created_at);
  assert_eq!(by_serial.phone.as_deref(), Some("+1 555 0100"));

  let by_email = s
    .find_holder_by_email("GRACE@example.com".into())
    .await
    .unwrap();
  assert!(by_email.is_some(), "email lookup is case-insensitive");
}

#[tokio::test]
async fn duplicate_serial_is_reported_not_raised() {
  let s = store().await;
  let new = |email: &str| NewHolder {
    email:        email.into(),
    name:         None,
    phone:        None,
    discount_pct: Percent::new(5).unwrap(),
    pass_serial:  "SAMESERIAL00".into(),
  };
  s.insert_holder(new("a@example.com"), None).await.unwrap();
  let second = s.insert_holder(new("b@example.com"), None).await.unwrap();
  assert!(matches!(second, InsertHolder::SerialTaken));
  assert_eq!(s.list_holders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_delivered_sets_flag() {
  let s = store().await;
  let e = enroll(&s, "a@example.com", None).await;

  assert!(s.mark_delivered(e.holder.holder_id).await.unwrap());
  let holder = s
    .find_holder_by_serial(e.holder.pass_serial.clone())
    .await
    .unwrap()
    .unwrap();
  assert!(holder.pass_delivered);

  assert!(!s.mark_delivered(uuid::Uuid::new_v4()).await.unwrap());
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_without_promotion_uses_default_discount() {
  let s = store().await;
  let e = enroll(&s, "  Ada@Example.com ", None).await;

  assert_eq!(e.holder.email, "Ada@Example.com");
  assert_eq!(e.holder.discount_pct.get(), 5);
  assert!(e.applied_promo.is_none());
  assert!(is_well_formed(&e.holder.pass_serial));
}

#[tokio::test]
async fn enroll_with_welcome_code_redeems_once() {
  let s = store().await;
  resolver::seed_defaults(&s).await.unwrap();

  let e = enroll(&s, "new@example.com", Some("welcome10")).await;
  assert_eq!(e.holder.discount_pct.get(), 10);
  assert_eq!(e.applied_promo.as_deref(), Some("WELCOME10"));

  let promo = s.find_promotion("WELCOME10".into()).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 1);

  let usage = s.list_promotion_usage(promo.promo_id).await.unwrap();
  assert_eq!(usage.len(), 1);
  assert_eq!(usage[0].holder_id, Some(e.holder.holder_id));
  assert_eq!(usage[0].discount_pct.get(), 10);
  assert_eq!(usage[0].requester, requester());
}

#[tokio::test]
async fn duplicate_email_is_rejected_without_side_effects() {
  let s = store().await;
  let promo = promotion(&s, "ONCE", 30, 10).await;
  enroll(&s, "dup@example.com", None).await;

  let err = enrollment::enroll(
    &s,
    &RandomSerials,
    &EnrollmentPolicy::default(),
    request("DUP@example.com", Some("ONCE")),
    &requester(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEmail(_)), "{err:?}");

  assert_eq!(s.list_holders().await.unwrap().len(), 1);
  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 0);
}

#[tokio::test]
async fn unknown_expired_or_inactive_codes_fall_back_to_default() {
  let s = store().await;
  let past = Utc::now() - Duration::days(1);
  let InsertPromotion::Inserted(_) = s
    .insert_promotion(NewPromotion {
      code: "OLD".into(),
      description: String::new(),
      discount_pct: 40,
      max_uses: 0,
      expires_at: Some(past),
      created_by: "admin".into(),
    })
    .await
    .unwrap()
  else {
    panic!("insert failed");
  };
  let off = promotion(&s, "OFF", 40, 0).await;
  resolver::set_active(&s, off.promo_id, false).await.unwrap();

  for (email, code) in [
    ("a@example.com", "NOPE"),
    ("b@example.com", "OLD"),
    ("c@example.com", "OFF"),
  ] {
    let e = enroll(&s, email, Some(code)).await;
    assert_eq!(e.holder.discount_pct.get(), 5, "{code}");
    assert!(e.applied_promo.is_none());
  }
  assert_eq!(s.find_promotion("OFF".into()).await.unwrap().unwrap().current_uses, 0);
}

#[tokio::test]
async fn taken_serial_is_redrawn() {
  let s = store().await;
  let first = enrollment::enroll(
    &s,
    &Scripted::new(&["AAAAAAAAAAAA"]),
    &EnrollmentPolicy::default(),
    request("a@example.com", None),
    &requester(),
  )
  .await
  .unwrap();
  assert_eq!(first.holder.pass_serial, "AAAAAAAAAAAA");

  let second = enrollment::enroll(
    &s,
    &Scripted::new(&["AAAAAAAAAAAA", "BBBBBBBBBBBB"]),
    &EnrollmentPolicy::default(),
    request("b@example.com", None),
    &requester(),
  )
  .await
  .unwrap();
  assert_eq!(second.holder.pass_serial, "BBBBBBBBBBBB");
}

#[tokio::test]
async fn serial_exhaustion_fails_cleanly() {
  let s = store().await;
  let promo = promotion(&s, "STUCK", 15, 0).await;
  enrollment::enroll(
    &s,
    &Scripted::new(&["AAAAAAAAAAAA"]),
    &EnrollmentPolicy::default(),
    request("a@example.com", None),
    &requester(),
  )
  .await
  .unwrap();

  let err = enrollment::enroll(
    &s,
    &Scripted::new(&["AAAAAAAAAAAA"]),
    &EnrollmentPolicy::default(),
    request("b@example.com", Some("STUCK")),
    &requester(),
  )
  .await
  .unwrap_err();
  assert!(
    matches!(err, CoreError::SerialExhausted(enrollment::MAX_SERIAL_ATTEMPTS)),
    "{err:?}"
  );

  assert_eq!(s.list_holders().await.unwrap().len(), 1);
  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enrollments_get_distinct_serials() {
  let s = store().await;
  let tasks: Vec<_> = (0..50)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move { enroll(&s, &format!("user{i}@example.com"), None).await })
    })
    .collect();

  let mut serials = HashSet::new();
  for task in tasks {
    serials.insert(task.await.unwrap().holder.pass_serial);
  }
  assert_eq!(serials.len(), 50);
  assert_eq!(s.list_holders().await.unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enrollments_respect_promotion_cap() {
  let s = store().await;
  let promo = promotion(&s, "FEW", 20, 30).await;

  let tasks: Vec<_> = (0..64)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        enroll(&s, &format!("race{i}@example.com"), Some("FEW")).await
      })
    })
    .collect();

  let mut promoted = 0;
  for task in tasks {
    let e = task.await.unwrap();
    match e.holder.discount_pct.get() {
      20 => promoted += 1,
      5 => assert!(e.applied_promo.is_none()),
      other => panic!("unexpected discount {other}"),
    }
  }
  assert_eq!(promoted, 30);

  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 30);
  assert_eq!(s.list_promotion_usage(promo.promo_id).await.unwrap().len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_unlimited_code_is_never_dropped() {
  let s = store().await;
  let promo = promotion(&s, "OPEN25", 25, 0).await;

  let tasks: Vec<_> = (0..64)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        enroll(&s, &format!("open{i}@example.com"), Some("OPEN25")).await
      })
    })
    .collect();

  for task in tasks {
    let e = task.await.unwrap();
    assert_eq!(e.holder.discount_pct.get(), 25);
    assert_eq!(e.applied_promo.as_deref(), Some("OPEN25"));
  }

  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 64);
}

// ─── Promotions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn seeding_only_fills_an_empty_table() {
  let s = store().await;
  assert_eq!(resolver::seed_defaults(&s).await.unwrap(), 4);
  assert_eq!(resolver::seed_defaults(&s).await.unwrap(), 0);

  let codes: HashSet<String> = s
    .list_promotions()
    .await
    .unwrap()
    .into_iter()
    .map(|p| p.code)
    .collect();
  for code in ["WELCOME10", "VIP15", "FRIEND20", "SUMMER25"] {
    assert!(codes.contains(code), "missing {code}");
  }

  let summer = s.find_promotion("SUMMER25".into()).await.unwrap().unwrap();
  assert_eq!(summer.max_uses, 0);
  assert!(summer.expires_at.is_some_and(|e| e > Utc::now()));
}

#[tokio::test]
async fn create_normalises_and_rejects_duplicates() {
  let s = store().await;
  let promo = promotion(&s, "  spring5 ", 5, 0).await;
  assert_eq!(promo.code, "SPRING5");
  assert_eq!(promo.current_uses, 0);
  assert!(promo.active);

  let err = resolver::create_promotion(&s, NewPromotion {
    code: "Spring5".into(),
    description: String::new(),
    discount_pct: 5,
    max_uses: 0,
    expires_at: None,
    created_by: "admin".into(),
  })
  .await
  .unwrap_err();
  assert!(matches!(err, CoreError::DuplicatePromotion(_)), "{err:?}");
}

#[tokio::test]
async fn validate_is_read_only() {
  let s = store().await;
  promotion(&s, "LOOK", 10, 1).await;

  for _ in 0..3 {
    assert!(resolver::validate(&s, "look").await.unwrap().is_some());
  }
  let promo = s.find_promotion("LOOK".into()).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 0);
}

#[tokio::test]
async fn consume_stops_at_cap() {
  let s = store().await;
  let promo = promotion(&s, "TWICE", 10, 2).await;

  assert!(resolver::consume(&s, "twice", &requester()).await.unwrap().is_some());
  assert!(resolver::consume(&s, "TWICE", &requester()).await.unwrap().is_some());
  assert!(resolver::consume(&s, "TWICE", &requester()).await.unwrap().is_none());

  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 2);
  let usage = s.list_promotion_usage(promo.promo_id).await.unwrap();
  assert_eq!(usage.len(), 2);
  assert!(usage.iter().all(|u| u.holder_id.is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_never_exceed_cap() {
  let s = store().await;
  let promo = promotion(&s, "RACE", 10, 50).await;

  let tasks: Vec<_> = (0..64)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move { resolver::consume(&s, "RACE", &requester()).await })
    })
    .collect();

  let mut consumed = 0;
  for task in tasks {
    if task.await.unwrap().unwrap().is_some() {
      consumed += 1;
    }
  }
  assert_eq!(consumed, 50);

  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 50);
  assert_eq!(s.list_promotion_usage(promo.promo_id).await.unwrap().len(), 50);
}

#[tokio::test]
async fn stale_claim_is_not_applied() {
  let s = store().await;
  let promo = promotion(&s, "STALE", 10, 0).await;
  let claim = promo.claim();

  resolver::consume(&s, "STALE", &requester()).await.unwrap();

  let outcome = s
    .try_consume_promotion(keycard_core::promotion::PromotionRedemption {
      claim,
      requester: requester(),
      at: Utc::now(),
    })
    .await
    .unwrap();
  assert!(matches!(
    outcome,
    keycard_core::store::ConsumePromotion::Stale
  ));
  let promo = s.find_promotion(promo.code).await.unwrap().unwrap();
  assert_eq!(promo.current_uses, 1);
}

#[tokio::test]
async fn toggling_unknown_promotion_is_not_found() {
  let s = store().await;
  let err = resolver::set_active(&s, uuid::Uuid::new_v4(), false)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PromotionNotFound(_)));
}

// ─── Scans and overrides ─────────────────────────────────────────────────────

#[tokio::test]
async fn every_lookup_is_recorded() {
  let s = store().await;
  let e = enroll(&s, "scan@example.com", None).await;

  let scanned = scan::lookup(&s, &e.holder.pass_serial, &requester())
    .await
    .unwrap();
  assert_eq!(scanned.holder.holder_id, e.holder.holder_id);
  assert_eq!(scanned.event.holder_id, Some(e.holder.holder_id));

  let err = scan::lookup(&s, "UNKNOWN00000", &requester())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::HolderNotFound(_)));

  let hits = s.list_scans(e.holder.pass_serial.clone()).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].holder_id, Some(e.holder.holder_id));
  assert_eq!(hits[0].scan_id, scanned.event.scan_id);
  assert_eq!(hits[0].scanned_at, scanned.event.scanned_at);

  let misses = s.list_scans("UNKNOWN00000".into()).await.unwrap();
  assert_eq!(misses.len(), 1);
  assert!(misses[0].holder_id.is_none());
  assert_eq!(misses[0].requester, requester());
}

#[tokio::test]
async fn blank_serial_is_rejected_before_recording() {
  let s = store().await;
  let err = scan::lookup(&s, "   ", &requester()).await.unwrap_err();
  assert!(matches!(err, CoreError::MissingSerial));
  assert!(s.list_scans(String::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn override_records_change_and_rejects_out_of_range() {
  let s = store().await;
  let e = enroll(&s, "vip@example.com", None).await;
  let serial = e.holder.pass_serial.clone();

  let change = scan::override_discount(&s, &serial, 40, &requester())
    .await
    .unwrap();
  assert_eq!(change.old_discount.get(), 5);
  assert_eq!(change.new_discount.get(), 40);

  let err = scan::override_discount(&s, &serial, 150, &requester())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::DiscountOutOfRange(150)), "{err:?}");

  let holder = s.find_holder_by_serial(serial).await.unwrap().unwrap();
  assert_eq!(holder.discount_pct.get(), 40);

  let changes = s
    .list_discount_changes(holder.holder_id)
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].old_discount.get(), 5);
  assert_eq!(changes[0].new_discount.get(), 40);
}

#[tokio::test]
async fn override_unknown_serial_writes_nothing() {
  let s = store().await;
  let err = scan::override_discount(&s, "NOBODY000000", 10, &requester())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::HolderNotFound(_)));
}

// ─── Holder edits ───────────────────────────────────────────────────────────

#[tokio::test]
async fn holder_edit_updates_fields_and_records_discount_change() {
  let s = store().await;
  let e = enroll(&s, "edit@example.com", None).await;
  let id = e.holder.holder_id;

  let edited = holder::update(
    &s,
    id,
    HolderEdit {
      name:           Some(" Grace Hopper ".into()),
      discount_pct:   Some(30),
      pass_delivered: Some(true),
    },
    &requester(),
  )
  .await
  .unwrap();
  assert_eq!(edited.name.as_deref(), Some("Grace Hopper"));
  assert_eq!(edited.discount_pct.get(), 30);
  assert!(edited.pass_delivered);
  assert_eq!(edited.pass_serial, e.holder.pass_serial);
  assert_eq!(edited.email, e.holder.email);
  assert_eq!(edited.created_at, e.holder.created_at);

  let stored = s.find_holder_by_serial(edited.pass_serial.clone()).await.unwrap();
  assert_eq!(stored, Some(edited.clone()));

  let changes = s.list_discount_changes(id).await.unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].serial, edited.pass_serial);
  assert_eq!(changes[0].old_discount.get(), 5);
  assert_eq!(changes[0].new_discount.get(), 30);
  assert_eq!(changes[0].requester, requester());
}

#[tokio::test]
async fn holder_edit_leaves_unset_fields_alone() {
  let s = store().await;
  let e = enroll(&s, "partial@example.com", None).await;
  let id = e.holder.holder_id;

  let edited = holder::update(
    &s,
    id,
    HolderEdit { pass_delivered: Some(true), ..Default::default() },
    &requester(),
  )
  .await
  .unwrap();
  assert_eq!(edited.name.as_deref(), Some("Ada Lovelace"));
  assert_eq!(edited.discount_pct.get(), 5);
  assert!(edited.pass_delivered);

  // Same discount and a blank name: the name is cleared, no change row.
  let edited = holder::update(
    &s,
    id,
    HolderEdit {
      name:           Some("".into()),
      discount_pct:   Some(5),
      pass_delivered: Some(false),
    },
    &requester(),
  )
  .await
  .unwrap();
  assert_eq!(edited.name, None);
  assert!(!edited.pass_delivered);
  assert!(s.list_discount_changes(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn holder_edit_out_of_range_writes_nothing() {
  let s = store().await;
  let e = enroll(&s, "range@example.com", None).await;
  let id = e.holder.holder_id;

  let err = holder::update(
    &s,
    id,
    HolderEdit {
      name:           Some("Changed".into()),
      discount_pct:   Some(150),
      pass_delivered: Some(true),
    },
    &requester(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, CoreError::DiscountOutOfRange(150)), "{err:?}");

  let stored = s
    .find_holder_by_serial(e.holder.pass_serial.clone())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored, e.holder);
  assert!(s.list_discount_changes(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn holder_edit_unknown_id() {
  let s = store().await;
  let err = holder::update(
    &s,
    uuid::Uuid::new_v4(),
    HolderEdit { discount_pct: Some(10), ..Default::default() },
    &requester(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, CoreError::HolderNotFound(_)), "{err:?}");
}
