//! [`SqliteStore`], the SQLite implementation of [`MembershipStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use keycard_core::{
  Percent,
  audit::{DiscountChange, NewScanEvent, Requester, ScanEvent},
  holder::{Holder, HolderUpdate, NewHolder},
  promotion::{NewPromotion, PromotionCode, PromotionRedemption, PromotionUsage},
  store::{ConsumePromotion, InsertHolder, InsertPromotion, MembershipStore},
};

use crate::{
  Error, Result,
  encode::{
    CHANGE_COLUMNS, HOLDER_COLUMNS, PROMOTION_COLUMNS, RawChange, RawHolder,
    RawPromotion, RawScan, RawUsage, SCAN_COLUMNS, USAGE_COLUMNS, decode_uuid,
    decode_percent, encode_dt, encode_uuid, now,
  },
  schema::{MIGRATIONS, PRAGMAS, latest_version},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Keycard store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run pending migrations.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.migrate().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.migrate().await?;
    Ok(store)
  }

  /// The schema version currently recorded in the database.
  pub async fn schema_version(&self) -> Result<i64> {
    Ok(
      self
        .conn
        .call(|conn| Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?))
        .await?,
    )
  }

  async fn migrate(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;

    let found = self.schema_version().await?;
    let supported = latest_version();
    if found > supported {
      return Err(Error::SchemaTooNew { found, supported });
    }
    if found == supported {
      return Ok(());
    }

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for sql in MIGRATIONS.iter().skip(found as usize) {
          tx.execute_batch(sql)?;
        }
        tx.pragma_update(None, "user_version", supported)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    info!(from = found, to = supported, "migrated membership store");
    Ok(())
  }

  async fn query_holder(&self, column: &'static str, value: String) -> Result<Option<Holder>> {
    let raw: Option<RawHolder> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {HOLDER_COLUMNS} FROM holders WHERE {column} = ?1"),
              rusqlite::params![value],
              RawHolder::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawHolder::into_holder).transpose()
  }
}

// ─── Write helpers ───────────────────────────────────────────────────────────

/// The conditional increment every redemption goes through. Matches no row
/// (returns 0) when the counter moved since `expected_uses` was read, or when
/// the promotion stopped being redeemable at `at`.
const CONDITIONAL_INCREMENT: &str = "
UPDATE promotion_codes
   SET current_uses = current_uses + 1
 WHERE promo_id = ?1
   AND current_uses = ?2
   AND active = 1
   AND (expires_at IS NULL OR expires_at > ?3)
   AND (max_uses = 0 OR current_uses < max_uses)";

/// A redemption encoded for the database thread.
struct RedemptionRow {
  promo_id:      String,
  expected_uses: i64,
  at:            String,
  usage:         UsageRow,
}

struct UsageRow {
  usage_id:     String,
  promo_id:     String,
  code:         String,
  discount_pct: i64,
  holder_id:    Option<String>,
  used_at:      String,
  ip_address:   Option<String>,
  user_agent:   Option<String>,
}

impl RedemptionRow {
  fn new(usage: &PromotionUsage, expected_uses: u32, at: DateTime<Utc>) -> Self {
    Self {
      promo_id: encode_uuid(usage.promo_id),
      expected_uses: i64::from(expected_uses),
      at: encode_dt(at),
      usage: UsageRow {
        usage_id:     encode_uuid(usage.usage_id),
        promo_id:     encode_uuid(usage.promo_id),
        code:         usage.code.clone(),
        discount_pct: i64::from(usage.discount_pct.get()),
        holder_id:    usage.holder_id.map(encode_uuid),
        used_at:      encode_dt(usage.used_at),
        ip_address:   usage.requester.address.clone(),
        user_agent:   usage.requester.user_agent.clone(),
      },
    }
  }

  /// Returns `false` if the conditional increment matched nothing, in which
  /// case no usage row is written either.
  fn apply(&self, conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    let updated = conn.execute(
      CONDITIONAL_INCREMENT,
      rusqlite::params![self.promo_id, self.expected_uses, self.at],
    )?;
    if updated == 0 {
      return Ok(false);
    }
    conn.execute(
      &format!("INSERT INTO promotion_usage ({USAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
      rusqlite::params![
        self.usage.usage_id,
        self.usage.promo_id,
        self.usage.code,
        self.usage.discount_pct,
        self.usage.holder_id,
        self.usage.used_at,
        self.usage.ip_address,
        self.usage.user_agent,
      ],
    )?;
    Ok(true)
  }
}

fn usage_for(
  redemption: &PromotionRedemption,
  holder_id: Option<Uuid>,
) -> PromotionUsage {
  PromotionUsage {
    usage_id:     Uuid::new_v4(),
    promo_id:     redemption.claim.promo_id,
    code:         redemption.claim.code.clone(),
    discount_pct: redemption.claim.discount_pct,
    holder_id,
    used_at:      redemption.at.trunc_subsecs(6),
    requester:    redemption.requester.clone(),
  }
}

/// The failing table and column of a UNIQUE violation, e.g.
/// `holders.pass_serial`.
fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
  match err {
    rusqlite::Error::SqliteFailure(e, Some(msg))
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
    {
      msg.strip_prefix("UNIQUE constraint failed: ")
    }
    _ => None,
  }
}

/// What a transactional write ended with, as seen from the database thread.
enum Written {
  Committed,
  EmailTaken,
  SerialTaken,
  CodeTaken,
  Stale,
}

struct PromotionRow {
  promo_id:     String,
  code:         String,
  description:  String,
  discount_pct: i64,
  max_uses:     i64,
  expires_at:   Option<String>,
  created_by:   String,
  created_at:   String,
}

impl PromotionRow {
  fn new(promo: &PromotionCode) -> Self {
    Self {
      promo_id:     encode_uuid(promo.promo_id),
      code:         promo.code.clone(),
      description:  promo.description.clone(),
      discount_pct: i64::from(promo.discount_pct.get()),
      max_uses:     i64::from(promo.max_uses),
      expires_at:   promo.expires_at.map(encode_dt),
      created_by:   promo.created_by.clone(),
      created_at:   encode_dt(promo.created_at),
    }
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute(
      &format!(
        "INSERT INTO promotion_codes ({PROMOTION_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7, ?8)"
      ),
      rusqlite::params![
        self.promo_id,
        self.code,
        self.description,
        self.discount_pct,
        self.max_uses,
        self.expires_at,
        self.created_by,
        self.created_at,
      ],
    )
  }
}

/// Build the in-memory record for a promotion about to be inserted.
fn new_promotion(input: NewPromotion) -> Result<PromotionCode> {
  Ok(PromotionCode {
    promo_id:     Uuid::new_v4(),
    code:         input.code,
    description:  input.description,
    discount_pct: Percent::new(input.discount_pct)?,
    max_uses:     input.max_uses,
    current_uses: 0,
    active:       true,
    expires_at:   input.expires_at.map(|e| e.trunc_subsecs(6)),
    created_by:   input.created_by,
    created_at:   now(),
  })
}

// ─── MembershipStore impl ────────────────────────────────────────────────────

impl MembershipStore for SqliteStore {
  type Error = Error;

  // ── Holders ───────────────────────────────────────────────────────────────

  async fn find_holder_by_email(&self, email: String) -> Result<Option<Holder>> {
    self.query_holder("email", email).await
  }

  async fn find_holder_by_serial(&self, serial: String) -> Result<Option<Holder>> {
    self.query_holder("pass_serial", serial).await
  }

  async fn serial_taken(&self, serial: String) -> Result<bool> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT 1 FROM holders WHERE pass_serial = ?1",
                rusqlite::params![serial],
                |_| Ok(()),
              )
              .optional()?
              .is_some(),
          )
        })
        .await?,
    )
  }

  async fn insert_holder(
    &self,
    input: NewHolder,
    redemption: Option<PromotionRedemption>,
  ) -> Result<InsertHolder> {
    let holder = Holder {
      holder_id:      Uuid::new_v4(),
      email:          input.email,
      name:           input.name,
      phone:          input.phone,
      discount_pct:   input.discount_pct,
      pass_serial:    input.pass_serial,
      pass_delivered: false,
      created_at:     now(),
    };
    let usage = redemption
      .as_ref()
      .map(|r| usage_for(r, Some(holder.holder_id)));
    let redemption_row = redemption
      .as_ref()
      .zip(usage.as_ref())
      .map(|(r, u)| RedemptionRow::new(u, r.claim.expected_uses, r.at));

    let params = (
      encode_uuid(holder.holder_id),
      holder.email.clone(),
      holder.name.clone(),
      holder.phone.clone(),
      i64::from(holder.discount_pct.get()),
      holder.pass_serial.clone(),
      encode_dt(holder.created_at),
    );

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // The holder row goes in first so the usage row can reference it;
        // a stale redemption rolls both back.
        let (id, email, name, phone, discount, serial, created_at) = params;
        let inserted = tx.execute(
          &format!(
            "INSERT INTO holders ({HOLDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)"
          ),
          rusqlite::params![id, email, name, phone, discount, serial, created_at],
        );
        if let Err(e) = inserted {
          return match unique_violation(&e) {
            Some("holders.email") => Ok(Written::EmailTaken),
            Some("holders.pass_serial") => Ok(Written::SerialTaken),
            _ => Err(e.into()),
          };
        }

        if let Some(row) = &redemption_row
          && !row.apply(&tx)?
        {
          return Ok(Written::Stale);
        }

        tx.commit()?;
        Ok(Written::Committed)
      })
      .await?;

    Ok(match written {
      Written::Committed => InsertHolder::Inserted { holder, usage },
      Written::EmailTaken => InsertHolder::EmailTaken,
      Written::SerialTaken => InsertHolder::SerialTaken,
      Written::Stale | Written::CodeTaken => InsertHolder::PromotionStale,
    })
  }

  async fn list_holders(&self) -> Result<Vec<Holder>> {
    let raws: Vec<RawHolder> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HOLDER_COLUMNS} FROM holders ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map([], RawHolder::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHolder::into_holder).collect()
  }

  async fn mark_delivered(&self, holder_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(holder_id);
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE holders SET pass_delivered = 1 WHERE holder_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(updated > 0)
  }

  async fn update_holder(
    &self,
    holder_id: Uuid,
    update: HolderUpdate,
    requester: Requester,
  ) -> Result<Option<Holder>> {
    let params = (
      encode_uuid(holder_id),
      encode_uuid(Uuid::new_v4()),
      encode_dt(now()),
      requester.address,
      requester.user_agent,
    );

    let raw: Option<RawHolder> = self
      .conn
      .call(move |conn| {
        let (holder_id, change_id, at, address, agent) = params;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let select = format!("SELECT {HOLDER_COLUMNS} FROM holders WHERE holder_id = ?1");

        let Some(current) = tx
          .query_row(&select, rusqlite::params![holder_id], RawHolder::from_row)
          .optional()?
        else {
          return Ok(None);
        };

        let name = update.name.unwrap_or(current.name);
        let discount = update
          .discount_pct
          .map_or(current.discount_pct, |p| i64::from(p.get()));
        let delivered = update.pass_delivered.unwrap_or(current.pass_delivered);

        tx.execute(
          "UPDATE holders SET name = ?2, discount_pct = ?3, pass_delivered = ?4
           WHERE holder_id = ?1",
          rusqlite::params![holder_id, name, discount, delivered],
        )?;
        if discount != current.discount_pct {
          tx.execute(
            &format!(
              "INSERT INTO discount_changes ({CHANGE_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            rusqlite::params![
              change_id,
              holder_id,
              current.pass_serial,
              current.discount_pct,
              discount,
              at,
              address,
              agent
            ],
          )?;
        }

        let updated = tx.query_row(&select, rusqlite::params![holder_id], RawHolder::from_row)?;
        tx.commit()?;
        Ok(Some(updated))
      })
      .await?;

    raw.map(RawHolder::into_holder).transpose()
  }

  // ── Promotions ────────────────────────────────────────────────────────────

  async fn find_promotion(&self, code: String) -> Result<Option<PromotionCode>> {
    let raw: Option<RawPromotion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROMOTION_COLUMNS} FROM promotion_codes WHERE code = ?1"),
              rusqlite::params![code],
              RawPromotion::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPromotion::into_promotion).transpose()
  }

  async fn list_promotions(&self) -> Result<Vec<PromotionCode>> {
    let raws: Vec<RawPromotion> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROMOTION_COLUMNS} FROM promotion_codes
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map([], RawPromotion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPromotion::into_promotion).collect()
  }

  async fn insert_promotion(&self, input: NewPromotion) -> Result<InsertPromotion> {
    let promo = new_promotion(input)?;
    let row = PromotionRow::new(&promo);

    let written = self
      .conn
      .call(move |conn| match row.insert(conn) {
        Ok(_) => Ok(Written::Committed),
        Err(e) if unique_violation(&e) == Some("promotion_codes.code") => {
          Ok(Written::CodeTaken)
        }
        Err(e) => Err(e.into()),
      })
      .await?;

    Ok(match written {
      Written::Committed => InsertPromotion::Inserted(promo),
      _ => InsertPromotion::CodeTaken,
    })
  }

  async fn seed_promotions(&self, seeds: Vec<NewPromotion>) -> Result<usize> {
    let rows = seeds
      .into_iter()
      .map(|s| new_promotion(s).map(|p| PromotionRow::new(&p)))
      .collect::<Result<Vec<_>>>()?;

    Ok(
      self
        .conn
        .call(move |conn| {
          let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
          let existing: i64 =
            tx.query_row("SELECT COUNT(*) FROM promotion_codes", [], |r| r.get(0))?;
          if existing > 0 {
            return Ok(0);
          }
          for row in &rows {
            row.insert(&tx)?;
          }
          tx.commit()?;
          Ok(rows.len())
        })
        .await?,
    )
  }

  async fn set_promotion_active(
    &self,
    promo_id: Uuid,
    active: bool,
  ) -> Result<Option<PromotionCode>> {
    let id_str = encode_uuid(promo_id);
    let raw: Option<RawPromotion> = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE promotion_codes SET active = ?2 WHERE promo_id = ?1",
          rusqlite::params![id_str, active],
        )?;
        if updated == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!("SELECT {PROMOTION_COLUMNS} FROM promotion_codes WHERE promo_id = ?1"),
          rusqlite::params![id_str],
          RawPromotion::from_row,
        )?))
      })
      .await?;

    raw.map(RawPromotion::into_promotion).transpose()
  }

  async fn try_consume_promotion(
    &self,
    redemption: PromotionRedemption,
  ) -> Result<ConsumePromotion> {
    let usage = usage_for(&redemption, None);
    let row = RedemptionRow::new(&usage, redemption.claim.expected_uses, redemption.at);

    let consumed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !row.apply(&tx)? {
          return Ok(false);
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if consumed {
      Ok(ConsumePromotion::Consumed(usage))
    } else {
      debug!(code = %redemption.claim.code, "conditional increment matched no row");
      Ok(ConsumePromotion::Stale)
    }
  }

  async fn list_promotion_usage(&self, promo_id: Uuid) -> Result<Vec<PromotionUsage>> {
    let id_str = encode_uuid(promo_id);
    let raws: Vec<RawUsage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USAGE_COLUMNS} FROM promotion_usage
           WHERE promo_id = ?1 ORDER BY used_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawUsage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUsage::into_usage).collect()
  }

  // ── Scans and overrides ───────────────────────────────────────────────────

  async fn record_scan(&self, event: NewScanEvent) -> Result<ScanEvent> {
    let scan = ScanEvent {
      scan_id:    Uuid::new_v4(),
      holder_id:  event.holder_id,
      serial:     event.serial,
      scanned_at: now(),
      requester:  event.requester,
    };

    let params = (
      encode_uuid(scan.scan_id),
      scan.holder_id.map(encode_uuid),
      scan.serial.clone(),
      encode_dt(scan.scanned_at),
      scan.requester.address.clone(),
      scan.requester.user_agent.clone(),
    );

    self
      .conn
      .call(move |conn| {
        let (id, holder_id, serial, at, address, agent) = params;
        conn.execute(
          &format!("INSERT INTO scan_events ({SCAN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
          rusqlite::params![id, holder_id, serial, at, address, agent],
        )?;
        Ok(())
      })
      .await?;

    Ok(scan)
  }

  async fn list_scans(&self, serial: String) -> Result<Vec<ScanEvent>> {
    let raws: Vec<RawScan> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SCAN_COLUMNS} FROM scan_events
           WHERE serial = ?1 ORDER BY scanned_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![serial], RawScan::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScan::into_scan).collect()
  }

  async fn update_discount(
    &self,
    serial: String,
    new_discount: Percent,
    requester: Requester,
  ) -> Result<Option<DiscountChange>> {
    let change_id = Uuid::new_v4();
    let changed_at = now();

    let params = (
      encode_uuid(change_id),
      serial.clone(),
      i64::from(new_discount.get()),
      encode_dt(changed_at),
      requester.address.clone(),
      requester.user_agent.clone(),
    );

    let previous: Option<(String, i64)> = self
      .conn
      .call(move |conn| {
        let (change_id, serial, new, at, address, agent) = params;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((holder_id, old)) = tx
          .query_row(
            "SELECT holder_id, discount_pct FROM holders WHERE pass_serial = ?1",
            rusqlite::params![serial],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
          )
          .optional()?
        else {
          return Ok(None);
        };

        tx.execute(
          "UPDATE holders SET discount_pct = ?2 WHERE holder_id = ?1",
          rusqlite::params![holder_id, new],
        )?;
        tx.execute(
          &format!(
            "INSERT INTO discount_changes ({CHANGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
          ),
          rusqlite::params![change_id, holder_id, serial, old, new, at, address, agent],
        )?;
        tx.commit()?;
        Ok(Some((holder_id, old)))
      })
      .await?;

    let Some((holder_id, old)) = previous else {
      return Ok(None);
    };

    Ok(Some(DiscountChange {
      change_id,
      holder_id: decode_uuid(&holder_id)?,
      serial,
      old_discount: decode_percent("discount_pct", old)?,
      new_discount,
      changed_at,
      requester,
    }))
  }

  async fn list_discount_changes(&self, holder_id: Uuid) -> Result<Vec<DiscountChange>> {
    let id_str = encode_uuid(holder_id);
    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CHANGE_COLUMNS} FROM discount_changes
           WHERE holder_id = ?1 ORDER BY changed_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawChange::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChange::into_change).collect()
  }
}
