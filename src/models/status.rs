// src/models/status.rs
//! Canonical status vocabulary. The UI and the database both speak Thai
//! status literals, so they are centralized here instead of being scattered
//! through the handlers.

/// Purchase order lifecycle statuses.
pub mod po {
    pub const PENDING: &str = "รอดำเนินการ";
    pub const RECEIVED: &str = "ได้รับสินค้าแล้ว";
    pub const QC_PASSED: &str = "QC ผ่าน";
    pub const QC_PARTIAL: &str = "QC ผ่านบางส่วน";
    pub const QC_FAILED_AWAITING_RETURN: &str = "ไม่ผ่าน QC - รอส่งคืนสินค้า";
    pub const QC_FAILED_RETURNED: &str = "ไม่ผ่าน QC - คืนสินค้าแล้ว";
    pub const QC_FAILED_PARTIALLY_RETURNED: &str = "ไม่ผ่าน QC - คืนสินค้าบางส่วนแล้ว";
    pub const CANCELLED: &str = "ยกเลิก";

    /// Statuses from which goods may still be sent back to the supplier.
    pub const RETURNABLE: [&str; 3] = [
        QC_FAILED_AWAITING_RETURN,
        QC_PARTIAL,
        QC_FAILED_PARTIALLY_RETURNED,
    ];
}

/// Stock lot statuses.
pub mod lot {
    pub const AWAITING_QC: &str = "รอตรวจสอบ QC";
    pub const SELLABLE: &str = "สินค้าพร้อมขาย";
    pub const AWAITING_DISPOSAL: &str = "รอคัดออก";
    pub const CLOSED: &str = "ปิดล็อต";
    pub const DAMAGED: &str = "สินค้าเสียหาย";
}

/// QC outcome statuses, shared by QC records, lots and PO headers.
pub mod qc {
    pub const PENDING: &str = "รอตรวจสอบ";
    pub const PASSED: &str = "ผ่าน";
    pub const PARTIAL: &str = "ผ่านบางส่วน";
    pub const FAILED: &str = "ไม่ผ่าน";
}

/// Supplier-return bookkeeping on a lot.
pub mod lot_return {
    pub const FULL: &str = "คืนทั้งหมด";
    pub const PARTIAL: &str = "คืนบางส่วน";
}

/// Stock aggregate statuses, derived from quantity vs threshold.
pub mod stock {
    pub const AVAILABLE: &str = "สินค้าพร้อมขาย";
    pub const LOW: &str = "สินค้าเหลือน้อย";
    pub const OUT: &str = "สินค้าหมด";
}

/// Expiry classification over a stock's active lots.
pub mod expiry {
    pub const NORMAL: &str = "ปกติ";
    pub const SOME_NEAR: &str = "ใกล้หมดอายุบางล็อต";
    pub const ALL_NEAR: &str = "ใกล้หมดอายุทั้งหมด";
    pub const SOME_EXPIRED: &str = "หมดอายุบางล็อต";
    pub const ALL_EXPIRED: &str = "หมดอายุทั้งหมด";
}

/// Stock transaction types (append-only ledger).
pub mod txn {
    pub const RESTOCK: &str = "RESTOCK";
    pub const ADJUSTMENT: &str = "ADJUSTMENT";
    pub const RETURN: &str = "RETURN";
    pub const SALE: &str = "SALE";
}

/// Derive the aggregate stock status from quantity and threshold.
pub fn stock_status_for(total_quantity: i64, threshold: i64) -> &'static str {
    if total_quantity <= 0 {
        stock::OUT
    } else if total_quantity <= threshold {
        stock::LOW
    } else {
        stock::AVAILABLE
    }
}

/// Derive a QC record status from inspection counts when the client did not
/// send one explicitly.
pub fn qc_status_from_counts(total: i64, failed: i64) -> &'static str {
    if failed <= 0 {
        qc::PASSED
    } else if failed >= total {
        qc::FAILED
    } else {
        qc::PARTIAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_thresholds() {
        assert_eq!(stock_status_for(0, 5), stock::OUT);
        assert_eq!(stock_status_for(-3, 5), stock::OUT);
        assert_eq!(stock_status_for(5, 5), stock::LOW);
        assert_eq!(stock_status_for(6, 5), stock::AVAILABLE);
    }

    #[test]
    fn test_qc_status_from_counts() {
        assert_eq!(qc_status_from_counts(10, 0), qc::PASSED);
        assert_eq!(qc_status_from_counts(10, 10), qc::FAILED);
        assert_eq!(qc_status_from_counts(10, 12), qc::FAILED);
        assert_eq!(qc_status_from_counts(10, 3), qc::PARTIAL);
    }

    #[test]
    fn test_returnable_statuses() {
        assert!(po::RETURNABLE.contains(&po::QC_PARTIAL));
        assert!(!po::RETURNABLE.contains(&po::QC_PASSED));
        assert!(!po::RETURNABLE.contains(&po::PENDING));
    }
}
