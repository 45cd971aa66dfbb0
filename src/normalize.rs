use crate::schema::{
    InstallmentInfo, RawTransactionRecord, Transaction, TransactionKind, TransactionStatus,
};
use crate::utils::parse_wire_date;
use chrono::NaiveDate;
use log::warn;

/// Canonical account currency code.
pub const SHEKEL_CURRENCY: &str = "ILS";
const SHEKEL_CURRENCY_KEYWORD: &str = "שקל";
const ALT_SHEKEL_CURRENCY: &str = "NIS";

/// Memo token marking an installment leg.
const INSTALLMENTS_KEYWORD: &str = "תשלום";
/// Voucher placeholder the institution writes on incomplete rows.
const EMPTY_VOUCHER: &str = "000000000";
/// Deal-sum type marking a non-chargeable placeholder row.
const NON_CHARGEABLE_DEAL_SUM_TYPE: &str = "1";

/// Map the institution's shekel spellings to the canonical code. Unknown
/// codes pass through verbatim so new currencies never break the pipeline.
pub fn normalize_currency(code: &str) -> &str {
    if code == SHEKEL_CURRENCY_KEYWORD || code == ALT_SHEKEL_CURRENCY {
        SHEKEL_CURRENCY
    } else {
        code
    }
}

/// Extract installment info from a memo: the first two integers appearing in
/// the text, in order, read as (leg number, total legs). Returns `None` when
/// the memo lacks the installment marker or carries fewer than two integers.
pub fn installments_info(memo: &str) -> Option<InstallmentInfo> {
    if !memo.contains(INSTALLMENTS_KEYWORD) {
        return None;
    }

    let mut numbers = memo
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty());

    let number = numbers.next()?.parse().ok()?;
    let total = numbers.next()?.parse().ok()?;
    Some(InstallmentInfo { number, total })
}

fn is_excluded(record: &RawTransactionRecord) -> bool {
    if record.deal_sum_type.as_deref() == Some(NON_CHARGEABLE_DEAL_SUM_TYPE) {
        return true;
    }

    // A row with no usable voucher in either direction is an incomplete
    // placeholder, not a transaction.
    record.voucher_number.as_deref().unwrap_or(EMPTY_VOUCHER) == EMPTY_VOUCHER
        && record
            .voucher_number_outbound
            .as_deref()
            .unwrap_or(EMPTY_VOUCHER)
            == EMPTY_VOUCHER
}

fn parse_identifier(voucher: &str) -> i64 {
    match voucher.trim().parse() {
        Ok(id) => id,
        Err(_) => {
            warn!("non-numeric voucher number '{}', using 0", voucher);
            0
        }
    }
}

/// Convert one raw record into a canonical transaction, or `None` for
/// placeholder rows. Field selection follows the record's direction: outbound
/// rows use the outbound voucher, date, supplier, and sums.
pub fn normalize_record(
    record: &RawTransactionRecord,
    processed_date: NaiveDate,
) -> Option<Transaction> {
    if is_excluded(record) {
        return None;
    }

    let outbound = record.is_outbound.unwrap_or(false);

    let (voucher, date_str, description, deal_sum, payment_sum) = if outbound {
        (
            record.voucher_number_outbound.as_deref(),
            record.full_purchase_date_outbound.as_deref(),
            record.full_supplier_name_outbound.as_deref(),
            record.deal_sum_outbound,
            record.payment_sum_outbound,
        )
    } else {
        (
            record.voucher_number.as_deref(),
            record.full_purchase_date.as_deref(),
            record.full_supplier_name_heb.as_deref(),
            record.deal_sum,
            record.payment_sum,
        )
    };

    let memo = record.more_info.clone().unwrap_or_default();
    let installments = installments_info(&memo);
    let kind = if installments.is_some() {
        TransactionKind::Installments
    } else {
        TransactionKind::Normal
    };

    // Raw sums are institution-positive; a purchase is canonically negative.
    Some(Transaction {
        kind,
        identifier: voucher.map(parse_identifier).unwrap_or(0),
        date: date_str.and_then(parse_wire_date),
        processed_date,
        original_amount: -deal_sum.unwrap_or_default(),
        original_currency: normalize_currency(record.currency_id.as_deref().unwrap_or_default())
            .to_string(),
        charged_amount: -payment_sum.unwrap_or_default(),
        description: description.unwrap_or_default().to_string(),
        memo,
        installments,
        status: TransactionStatus::Completed,
    })
}
