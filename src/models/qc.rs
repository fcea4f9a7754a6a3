// src/models/qc.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One quality inspection of a batch. Issues and attachment metadata are
/// stored as JSON text columns.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct QualityControl {
    pub id: String,
    pub user_id: String,
    pub batch_number: String,
    pub product_id: Option<String>,
    pub supplier_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub status: String,
    pub total_quantity: i64,
    pub passed_quantity: i64,
    pub failed_quantity: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    /// JSON array of strings.
    pub issues: Option<String>,
    /// JSON array of `{url, public_id}` objects.
    pub attachments: Option<String>,
    pub remarks: Option<String>,
    pub inspected_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QcAttachment {
    pub url: String,
    pub public_id: Option<String>,
}

/// API shape with issues/attachments decoded from their JSON columns.
#[derive(Debug, Serialize)]
pub struct QualityControlDetail {
    #[serde(flatten)]
    pub record: QualityControl,
    pub issue_list: Vec<String>,
    pub attachment_list: Vec<QcAttachment>,
}

impl QualityControlDetail {
    pub fn from_record(record: QualityControl) -> Self {
        let issue_list = record
            .issues
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        let attachment_list = record
            .attachments
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        QualityControlDetail {
            record,
            issue_list,
            attachment_list,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQcRequest {
    #[validate(length(min = 1, max = 100, message = "Batch number must be between 1 and 100 characters"))]
    pub batch_number: String,
    pub product_id: Option<String>,
    pub supplier_id: Option<String>,
    pub warehouse_id: Option<String>,
    #[validate(range(min = 0, message = "Total quantity must be non-negative"))]
    pub total_quantity: i64,
    #[validate(range(min = 0, message = "Passed quantity must be non-negative"))]
    pub passed_quantity: i64,
    #[validate(range(min = 0, message = "Failed quantity must be non-negative"))]
    pub failed_quantity: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub status: Option<String>,
    pub issues: Option<Vec<String>>,
    pub attachments: Option<Vec<QcAttachment>>,
    #[validate(length(max = 1000, message = "Remarks cannot exceed 1000 characters"))]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQcRequest {
    #[validate(length(min = 1, max = 50, message = "Status must be between 1 and 50 characters"))]
    pub status: Option<String>,
    #[validate(length(max = 1000, message = "Remarks cannot exceed 1000 characters"))]
    pub remarks: Option<String>,
    pub issues: Option<Vec<String>>,
}

/// PO-level QC resolution: pass or fail the whole order.
#[derive(Debug, Deserialize, Validate)]
pub struct ResolvePoQcRequest {
    #[validate(length(min = 1, max = 50, message = "QC status must be between 1 and 50 characters"))]
    pub qc_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(issues: Option<&str>, attachments: Option<&str>) -> QualityControl {
        QualityControl {
            id: "qc-1".to_string(),
            user_id: "u-1".to_string(),
            batch_number: "LOT-A-B-20250101-XXXX".to_string(),
            product_id: None,
            supplier_id: None,
            warehouse_id: None,
            status: "ผ่าน".to_string(),
            total_quantity: 10,
            passed_quantity: 10,
            failed_quantity: 0,
            temperature: None,
            humidity: None,
            issues: issues.map(|s| s.to_string()),
            attachments: attachments.map(|s| s.to_string()),
            remarks: None,
            inspected_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_detail_decodes_json_columns() {
        let detail = QualityControlDetail::from_record(record(
            Some(r#"["แตกหัก","บรรจุภัณฑ์ชำรุด"]"#),
            Some(r#"[{"url":"https://example.com/a.jpg","public_id":"a"}]"#),
        ));
        assert_eq!(detail.issue_list.len(), 2);
        assert_eq!(detail.attachment_list.len(), 1);
        assert_eq!(detail.attachment_list[0].url, "https://example.com/a.jpg");
    }

    #[test]
    fn test_detail_tolerates_missing_and_malformed_json() {
        let detail = QualityControlDetail::from_record(record(None, Some("not json")));
        assert!(detail.issue_list.is_empty());
        assert!(detail.attachment_list.is_empty());
    }
}
