// src/codes.rs - Invoice and batch number generation

use chrono::Utc;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;

lazy_static! {
    pub static ref INVOICE_NUMBER_RE: Regex =
        Regex::new(r"^INV-\d{8}-\d{6}$").expect("invalid invoice number regex");
    pub static ref BATCH_NUMBER_RE: Regex =
        Regex::new(r"^LOT-[A-Z0-9]+-[A-Z0-9]+-\d{8}-[A-Z0-9]{4}$")
            .expect("invalid batch number regex");
}

/// `INV-YYYYMMDD-XXXXXX` with a random six digit suffix.
pub fn generate_invoice_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: u32 = thread_rng().gen_range(0..1_000_000);
    format!("INV-{}-{:06}", date, suffix)
}

/// `PO-YYYYMMDD-XXXXXX` with a random six digit suffix.
pub fn generate_po_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: u32 = thread_rng().gen_range(0..1_000_000);
    format!("PO-{}-{:06}", date, suffix)
}

/// `LOT-{WH}-{SP}-YYYYMMDD-XXXX`. Warehouse and supplier codes are derived
/// from their names when no explicit code exists.
pub fn generate_batch_number(warehouse_code: &str, supplier_code: &str) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!(
        "LOT-{}-{}-{}-{}",
        normalize_code(warehouse_code),
        normalize_code(supplier_code),
        date,
        suffix
    )
}

/// Reduce a free-form name to a short uppercase ASCII code. Thai or empty
/// names fall back to "XX".
pub fn normalize_code(raw: &str) -> String {
    let code: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    if code.is_empty() {
        "XX".to_string()
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_number_format() {
        let inv = generate_invoice_number();
        assert!(INVOICE_NUMBER_RE.is_match(&inv), "bad format: {}", inv);
    }

    #[test]
    fn test_po_number_format() {
        let po = generate_po_number();
        assert!(po.starts_with("PO-"));
        assert_eq!(po.len(), "PO-20250101-123456".len());
    }

    #[test]
    fn test_batch_number_format() {
        let batch = generate_batch_number("WH1", "SUP");
        assert!(BATCH_NUMBER_RE.is_match(&batch), "bad format: {}", batch);
        assert!(batch.starts_with("LOT-WH1-SUP-"));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("Warehouse 1"), "WARE");
        assert_eq!(normalize_code("s-01"), "S01");
        assert_eq!(normalize_code("คลังหลัก"), "XX");
        assert_eq!(normalize_code(""), "XX");
    }
}
