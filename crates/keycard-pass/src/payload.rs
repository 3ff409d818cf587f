//! The `pass.json` member, rendered for one holder.

use keycard_core::holder::Holder;
use serde::{Deserialize, Serialize};

/// Shown when a holder enrolled without a name.
pub const FALLBACK_NAME: &str = "Member";

const BARCODE_FORMAT: &str = "PKBarcodeFormatQR";
const BARCODE_ENCODING: &str = "iso-8859-1";

// ─── Template ────────────────────────────────────────────────────────────────

/// Issuer-wide values shared by every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassTemplate {
  pub organization_name: String,
  pub description:       String,
  pub pass_type_id:      String,
  pub team_id:           String,
  pub colors:            Colors,
  /// Back-of-pass text.
  pub terms:             String,
  pub contact:           String,
}

/// CSS-style `rgb(r, g, b)` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Colors {
  pub foreground: String,
  pub background: String,
  pub label:      String,
}

impl Default for Colors {
  fn default() -> Self {
    Self {
      foreground: "rgb(255, 255, 255)".into(),
      background: "rgb(0, 0, 0)".into(),
      label:      "rgb(184, 167, 93)".into(),
    }
  }
}

// ─── pass.json ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassJson {
  pub description:          String,
  pub format_version:       u8,
  pub organization_name:    String,
  pub pass_type_identifier: String,
  pub serial_number:        String,
  pub team_identifier:      String,
  pub foreground_color:     String,
  pub background_color:     String,
  pub label_color:          String,
  pub store_card:           StoreCard,
  /// Single-barcode key read by older wallets.
  pub barcode:              Barcode,
  pub barcodes:             Vec<Barcode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCard {
  pub header_fields:    Vec<Field>,
  pub primary_fields:   Vec<Field>,
  pub secondary_fields: Vec<Field>,
  pub auxiliary_fields: Vec<Field>,
  pub back_fields:      Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
  pub key:   String,
  pub label: String,
  pub value: String,
}

impl Field {
  fn new(key: &str, label: &str, value: impl Into<String>) -> Self {
    Self { key: key.into(), label: label.into(), value: value.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Barcode {
  pub message:          String,
  pub format:           String,
  pub message_encoding: String,
}

/// Render the payload for `holder`.
pub fn render(template: &PassTemplate, holder: &Holder) -> PassJson {
  let serial = &holder.pass_serial;
  let barcode = Barcode {
    message:          serial.clone(),
    format:           BARCODE_FORMAT.into(),
    message_encoding: BARCODE_ENCODING.into(),
  };

  let mut back_fields = Vec::new();
  if !template.terms.is_empty() {
    back_fields.push(Field::new("terms", "Terms", &template.terms));
  }
  if !template.contact.is_empty() {
    back_fields.push(Field::new("contact", "Contact", &template.contact));
  }

  PassJson {
    description: template.description.clone(),
    format_version: 1,
    organization_name: template.organization_name.clone(),
    pass_type_identifier: template.pass_type_id.clone(),
    serial_number: serial.clone(),
    team_identifier: template.team_id.clone(),
    foreground_color: template.colors.foreground.clone(),
    background_color: template.colors.background.clone(),
    label_color: template.colors.label.clone(),
    store_card: StoreCard {
      header_fields: vec![Field::new(
        "member",
        "Member",
        holder.display_name(FALLBACK_NAME),
      )],
      primary_fields: vec![Field::new(
        "discount",
        "Discount",
        holder.discount_pct.to_string(),
      )],
      secondary_fields: vec![Field::new(
        "joined",
        "Member since",
        holder.created_at.format("%m/%Y").to_string(),
      )],
      auxiliary_fields: vec![Field::new("serial", "Card number", serial_tail(serial))],
      back_fields,
    },
    barcodes: vec![barcode.clone()],
    barcode,
  }
}

/// The last six characters of `serial`, or all of it if shorter.
fn serial_tail(serial: &str) -> &str {
  serial
    .char_indices()
    .rev()
    .nth(5)
    .map_or(serial, |(i, _)| &serial[i..])
}
