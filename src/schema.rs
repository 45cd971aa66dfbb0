use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shared envelope header on every institution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHeader {
    #[serde(rename = "Status")]
    pub status: String,
}

/// Literal status value the institution uses for a successful response.
pub const RESPONSE_STATUS_OK: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMonthResponse {
    #[serde(rename = "Header")]
    pub header: Option<ResponseHeader>,
    #[serde(rename = "DashboardMonthBean")]
    pub bean: Option<DashboardMonthBean>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMonthBean {
    #[serde(rename = "cardsCharges")]
    pub cards_charges: Option<Vec<CardCharge>>,
}

/// One active card for a billing month, as reported by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardCharge {
    #[serde(rename = "cardIndex")]
    pub card_index: String,
    #[serde(rename = "cardNumber")]
    pub card_number: String,
    #[serde(rename = "billingDate")]
    pub billing_date: String,
}

/// Envelope of the monthly transactions endpoint. The per-card payloads live
/// under dynamic `Index{N}` keys inside the bean, so the bean stays untyped
/// and is drilled into by card index.
#[derive(Debug, Clone, Deserialize)]
pub struct CardsTransactionsListResponse {
    #[serde(rename = "Header")]
    pub header: Option<ResponseHeader>,
    #[serde(rename = "CardsTransactionsListBean")]
    pub bean: Option<serde_json::Value>,
}

/// One transaction group under `CurrentCardTransactions`: a domestic list and
/// an abroad list, either of which may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionGroup {
    #[serde(rename = "txnIsrael")]
    pub txn_israel: Option<Vec<RawTransactionRecord>>,
    #[serde(rename = "txnAbroad")]
    pub txn_abroad: Option<Vec<RawTransactionRecord>>,
}

/// A single transaction row exactly as the institution reports it.
///
/// Every field is optional: the feed routinely omits the domestic fields on
/// outbound rows and vice versa, and placeholder rows omit almost everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTransactionRecord {
    #[serde(rename = "dealSumType")]
    pub deal_sum_type: Option<String>,
    #[serde(rename = "voucherNumberRatz")]
    pub voucher_number: Option<String>,
    #[serde(rename = "voucherNumberRatzOutbound")]
    pub voucher_number_outbound: Option<String>,
    #[serde(rename = "moreInfo")]
    pub more_info: Option<String>,
    #[serde(rename = "isOutbound")]
    pub is_outbound: Option<bool>,
    #[serde(rename = "currencyId")]
    pub currency_id: Option<String>,
    #[serde(rename = "dealSum")]
    pub deal_sum: Option<f64>,
    #[serde(rename = "dealSumOutbound")]
    pub deal_sum_outbound: Option<f64>,
    #[serde(rename = "fullPurchaseDate")]
    pub full_purchase_date: Option<String>,
    #[serde(rename = "fullPurchaseDateOutbound")]
    pub full_purchase_date_outbound: Option<String>,
    #[serde(rename = "fullSupplierNameHeb")]
    pub full_supplier_name_heb: Option<String>,
    #[serde(rename = "fullSupplierNameOutbound")]
    pub full_supplier_name_outbound: Option<String>,
    #[serde(rename = "paymentSum")]
    pub payment_sum: Option<f64>,
    #[serde(rename = "paymentSumOutbound")]
    pub payment_sum_outbound: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateIdDataResponse {
    #[serde(rename = "Header")]
    pub header: Option<ResponseHeader>,
    #[serde(rename = "ValidateIdDataBean")]
    pub bean: Option<ValidateIdDataBean>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateIdDataBean {
    #[serde(rename = "returnCode")]
    pub return_code: Option<String>,
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogonResponse {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransactionKind {
    /// A one-off charge.
    Normal,
    /// One leg of a multi-month installment plan.
    Installments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransactionStatus {
    /// The only status this feed produces; pending charges arrive on other
    /// feeds entirely.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentInfo {
    /// 1-based index of this leg within the plan.
    pub number: u32,
    /// Total number of legs in the plan.
    pub total: u32,
}

/// A normalized transaction. Purchases carry negative amounts; refunds
/// positive. `original_amount` and `charged_amount` always share a sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    /// Direction-selected voucher number.
    pub identifier: i64,
    /// Purchase date. `None` when the wire date failed to parse; such
    /// records are kept and never filtered out by date.
    pub date: Option<NaiveDate>,
    /// Billing date of the statement this transaction belongs to.
    pub processed_date: NaiveDate,
    pub original_amount: f64,
    pub original_currency: String,
    /// Amount charged to the account, in account currency.
    pub charged_amount: f64,
    pub description: String,
    pub memo: String,
    pub installments: Option<InstallmentInfo>,
    pub status: TransactionStatus,
}

/// An active card resolved for one calendar month. Billing dates shift from
/// month to month, so this is recomputed fresh every month and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMonthInfo {
    pub index: u32,
    pub account_number: String,
    pub processed_date: NaiveDate,
}

/// Final output of a scrape: per-account ledgers keyed by account number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub accounts: BTreeMap<String, Vec<Transaction>>,
}

/// Parameters distinguishing one institution of the family from another.
#[derive(Debug, Clone)]
pub struct InstitutionConfig {
    pub base_url: String,
    pub company_code: String,
}

impl InstitutionConfig {
    pub fn new(base_url: impl Into<String>, company_code: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            company_code: company_code.into(),
        }
    }

    pub fn services_url(&self) -> String {
        format!("{}/services/ProcessRequest.aspx", self.base_url)
    }

    pub fn login_page_url(&self) -> String {
        format!("{}/personalarea/Login", self.base_url)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub id: String,
    pub card_suffix: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("card_suffix", &self.card_suffix)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Earliest transaction date the caller wants. History is capped at one
    /// year back regardless.
    pub start_date: Option<NaiveDate>,
    /// When true, installment legs are kept as-is instead of being collapsed
    /// into a single purchase.
    pub combine_installments: bool,
}
