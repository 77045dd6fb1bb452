//! CPE 2.3 identifiers.
//!
//! A CPE match string has 13 colon-separated fields:
//! `cpe:2.3:part:vendor:product:version:update:edition:language:sw_edition:target_sw:target_hw:other`.
//! The legacy 2.2 form `cpe:/part:vendor:product:version` is accepted on
//! parse; missing trailing components default to `*`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A parsed CPE 2.3 match string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeIdentifier {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub update: String,
    pub edition: String,
    pub language: String,
    pub sw_edition: String,
    pub target_sw: String,
    pub target_hw: String,
    pub other: String,
}

impl CpeIdentifier {
    /// Build an identifier from the four leading components, wildcarding the
    /// rest.
    pub fn new(part: &str, vendor: &str, product: &str, version: &str) -> Self {
        CpeIdentifier {
            part: part.to_string(),
            vendor: vendor.to_string(),
            product: product.to_string(),
            version: version.to_string(),
            update: "*".into(),
            edition: "*".into(),
            language: "*".into(),
            sw_edition: "*".into(),
            target_sw: "*".into(),
            target_hw: "*".into(),
            other: "*".into(),
        }
    }

    /// The `vendor:product:version` key used for SoftwareVersion lookups.
    pub fn vendor_product_version(&self) -> String {
        format!("{}:{}:{}", self.vendor, self.product, self.version)
    }

    /// The `vendor:product` prefix used for per-product version enumeration.
    pub fn vendor_product(&self) -> String {
        format!("{}:{}", self.vendor, self.product)
    }
}

impl fmt::Display for CpeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpe:2.3:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.part,
            self.vendor,
            self.product,
            self.version,
            self.update,
            self.edition,
            self.language,
            self.sw_edition,
            self.target_sw,
            self.target_hw,
            self.other
        )
    }
}

impl FromStr for CpeIdentifier {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.first() != Some(&"cpe") || parts.len() < 2 {
            return Err(Error::BadInput(format!("invalid CPE string: {raw}")));
        }

        if parts[1] == "2.3" {
            let field = |idx: usize| -> String {
                match parts.get(idx) {
                    Some(value) if !value.is_empty() => (*value).to_string(),
                    _ => "*".into(),
                }
            };
            if parts.len() < 5 {
                return Err(Error::BadInput(format!("truncated CPE 2.3 string: {raw}")));
            }
            return Ok(CpeIdentifier {
                part: field(2),
                vendor: field(3),
                product: field(4),
                version: field(5),
                update: field(6),
                edition: field(7),
                language: field(8),
                sw_edition: field(9),
                target_sw: field(10),
                target_hw: field(11),
                other: field(12),
            });
        }

        // Legacy 2.2 form: "cpe:/part:vendor:product:version", trailing
        // components optional.
        if let Some(part) = parts[1].strip_prefix('/') {
            let field = |idx: usize| -> String {
                match parts.get(idx) {
                    Some(value) if !value.is_empty() => (*value).to_string(),
                    _ => "*".into(),
                }
            };
            return Ok(CpeIdentifier::new(part, &field(2), &field(3), &field(4)));
        }

        Err(Error::BadInput(format!("unrecognized CPE format: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpe23_round_trip() {
        let raw = "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*";
        let cpe: CpeIdentifier = raw.parse().unwrap();
        assert_eq!(cpe.part, "a");
        assert_eq!(cpe.vendor, "nginx");
        assert_eq!(cpe.product, "nginx");
        assert_eq!(cpe.version, "1.24");
        assert_eq!(cpe.to_string(), raw);
    }

    #[test]
    fn test_cpe23_missing_trailing_fields_default_to_wildcard() {
        let cpe: CpeIdentifier = "cpe:2.3:o:linux:linux_kernel:6.1".parse().unwrap();
        assert_eq!(cpe.update, "*");
        assert_eq!(cpe.other, "*");
        assert_eq!(
            cpe.to_string(),
            "cpe:2.3:o:linux:linux_kernel:6.1:*:*:*:*:*:*:*"
        );
    }

    #[test]
    fn test_legacy_cpe22_form() {
        let cpe: CpeIdentifier = "cpe:/a:foo:bar:1.0".parse().unwrap();
        assert_eq!(
            (
                cpe.part.as_str(),
                cpe.vendor.as_str(),
                cpe.product.as_str(),
                cpe.version.as_str()
            ),
            ("a", "foo", "bar", "1.0")
        );
        assert_eq!(cpe.update, "*");
    }

    #[test]
    fn test_legacy_cpe22_without_version() {
        let cpe: CpeIdentifier = "cpe:/h:cisco:asa".parse().unwrap();
        assert_eq!(cpe.version, "*");
    }

    #[test]
    fn test_invalid_strings_rejected() {
        assert!("nope".parse::<CpeIdentifier>().is_err());
        assert!("cpe:4.0:a:x:y:z".parse::<CpeIdentifier>().is_err());
        assert!("cpe:2.3:a".parse::<CpeIdentifier>().is_err());
    }

    #[test]
    fn test_lookup_keys() {
        let cpe = CpeIdentifier::new("a", "huawei", "fusioncompute", "8.0.0");
        assert_eq!(cpe.vendor_product_version(), "huawei:fusioncompute:8.0.0");
        assert_eq!(cpe.vendor_product(), "huawei:fusioncompute");
    }
}
