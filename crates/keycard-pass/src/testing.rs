//! Throwaway signing credentials generated in-process for tests.

use std::sync::OnceLock;

use openssl::{
  asn1::Asn1Time,
  bn::BigNum,
  hash::MessageDigest,
  nid::Nid,
  pkcs12::Pkcs12,
  pkey::{PKey, Private},
  rsa::Rsa,
  x509::{
    X509, X509Builder, X509NameBuilder,
    extension::{BasicConstraints, KeyUsage},
  },
};

pub struct Credentials {
  /// Self-signed root the intermediate chains to.
  pub root:             X509,
  pub intermediate_pem: Vec<u8>,
  /// Leaf key and certificate, issued by the intermediate.
  pub pkcs12_der:       Vec<u8>,
  pub passphrase:       &'static str,
}

pub fn credentials() -> &'static Credentials {
  static CREDS: OnceLock<Credentials> = OnceLock::new();
  CREDS.get_or_init(|| {
    let root_key = key();
    let root = certificate("Test Root", 1, &root_key, None, true);
    let mid_key = key();
    let mid = certificate("Test Intermediate", 2, &mid_key, Some((&root, &root_key)), true);
    let leaf_key = key();
    let leaf = certificate("Pass Type ID: pass.test", 3, &leaf_key, Some((&mid, &mid_key)), false);

    let passphrase = "correct horse";
    let pkcs12_der = Pkcs12::builder()
      .name("pass")
      .pkey(&leaf_key)
      .cert(&leaf)
      .build2(passphrase)
      .unwrap()
      .to_der()
      .unwrap();

    Credentials {
      intermediate_pem: mid.to_pem().unwrap(),
      root,
      pkcs12_der,
      passphrase,
    }
  })
}

fn key() -> PKey<Private> { PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap() }

fn certificate(
  common_name: &str,
  serial: u32,
  key: &PKey<Private>,
  issuer: Option<(&X509, &PKey<Private>)>,
  ca: bool,
) -> X509 {
  let mut name = X509NameBuilder::new().unwrap();
  name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
  let name = name.build();

  let mut b = X509Builder::new().unwrap();
  b.set_version(2).unwrap();
  let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
  b.set_serial_number(&serial).unwrap();
  b.set_subject_name(&name).unwrap();
  match issuer {
    Some((cert, _)) => b.set_issuer_name(cert.subject_name()).unwrap(),
    None => b.set_issuer_name(&name).unwrap(),
  }
  b.set_pubkey(key).unwrap();
  b.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
  b.set_not_after(&Asn1Time::days_from_now(2).unwrap()).unwrap();
  if ca {
    b.append_extension(BasicConstraints::new().critical().ca().build().unwrap())
      .unwrap();
    b.append_extension(
      KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .build()
        .unwrap(),
    )
    .unwrap();
  }
  let signing_key = issuer.map_or(key, |(_, k)| k);
  b.sign(signing_key, MessageDigest::sha256()).unwrap();
  b.build()
}

pub fn template() -> crate::PassTemplate {
  crate::PassTemplate {
    organization_name: "Test Shop".into(),
    description:       "Test Membership".into(),
    pass_type_id:      "pass.com.example.member".into(),
    team_id:           "ABCDE12345".into(),
    colors:            crate::payload::Colors::default(),
    terms:             "Valid in all stores".into(),
    contact:           "help@example.com".into(),
  }
}

pub fn holder(name: Option<&str>) -> keycard_core::holder::Holder {
  use chrono::{TimeZone, Utc};

  keycard_core::holder::Holder {
    holder_id:      uuid::Uuid::new_v4(),
    email:          "a@example.com".into(),
    name:           name.map(Into::into),
    phone:          None,
    discount_pct:   keycard_core::Percent::new(15).unwrap(),
    pass_serial:    "AbCdEf123456".into(),
    pass_delivered: false,
    created_at:     Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap(),
  }
}
