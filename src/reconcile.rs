use crate::schema::{Transaction, TransactionKind};
use chrono::{Months, NaiveDate};
use std::collections::BTreeMap;

/// Accumulated view of one installment plan while scanning a sequence.
struct PlanAccumulator {
    original_sum: f64,
    charged_sum: f64,
    rep_index: usize,
    rep_is_first_leg: bool,
    rep_date: Option<NaiveDate>,
}

fn earlier(candidate: Option<NaiveDate>, current: Option<NaiveDate>) -> bool {
    match (candidate, current) {
        (Some(c), Some(r)) => c < r,
        // A dated leg beats an undated one.
        (Some(_), None) => true,
        _ => false,
    }
}

/// Collapse multi-leg installment purchases into one transaction per plan.
///
/// Legs of the same purchase share identifier and merchant description. The
/// representative leg is the one with index 1 when visible, otherwise the
/// earliest-dated leg (the window may open mid-plan). Its amounts become the
/// sum over all visible legs and its installment descriptor is dropped, so
/// the result reads as a single completed purchase. Other legs are removed.
/// Non-installment transactions pass through untouched, in order.
pub fn fix_installments(txns: Vec<Transaction>) -> Vec<Transaction> {
    let mut plans: BTreeMap<(i64, String), PlanAccumulator> = BTreeMap::new();

    for (idx, txn) in txns.iter().enumerate() {
        if txn.kind != TransactionKind::Installments {
            continue;
        }
        let Some(info) = txn.installments else {
            continue;
        };

        let key = (txn.identifier, txn.description.clone());
        let plan = plans.entry(key).or_insert(PlanAccumulator {
            original_sum: 0.0,
            charged_sum: 0.0,
            rep_index: idx,
            rep_is_first_leg: info.number == 1,
            rep_date: txn.date,
        });

        plan.original_sum += txn.original_amount;
        plan.charged_sum += txn.charged_amount;

        if idx != plan.rep_index && !plan.rep_is_first_leg {
            if info.number == 1 {
                plan.rep_index = idx;
                plan.rep_is_first_leg = true;
                plan.rep_date = txn.date;
            } else if earlier(txn.date, plan.rep_date) {
                plan.rep_index = idx;
                plan.rep_date = txn.date;
            }
        }
    }

    txns.into_iter()
        .enumerate()
        .filter_map(|(idx, txn)| {
            if txn.kind != TransactionKind::Installments || txn.installments.is_none() {
                return Some(txn);
            }

            let key = (txn.identifier, txn.description.clone());
            let plan = &plans[&key];
            if plan.rep_index != idx {
                return None;
            }

            Some(Transaction {
                kind: TransactionKind::Normal,
                original_amount: plan.original_sum,
                charged_amount: plan.charged_sum,
                installments: None,
                ..txn
            })
        })
        .collect()
}

/// True when an installment leg's plan can still produce legs on or after
/// `start`, judged from the leg's own date and remaining leg count.
fn plan_reaches_window(txn: &Transaction, start: NaiveDate) -> bool {
    let Some(info) = txn.installments else {
        return false;
    };
    let Some(date) = txn.date else {
        return true;
    };

    let remaining = info.total.saturating_sub(info.number);
    date.checked_add_months(Months::new(remaining))
        .map_or(true, |last_leg| last_leg >= start)
}

/// Drop transactions dated strictly before `start`.
///
/// Undated transactions (unparseable wire dates) are never excludable and
/// always pass. With `combine_installments` set, an installment leg older
/// than `start` survives as long as its plan can still reach the window, so
/// ongoing plans are not truncated. Idempotent: re-applying with the same
/// arguments changes nothing.
pub fn filter_old_transactions(
    txns: Vec<Transaction>,
    start: NaiveDate,
    combine_installments: bool,
) -> Vec<Transaction> {
    txns.into_iter()
        .filter(|txn| match txn.date {
            None => true,
            Some(date) => {
                date >= start
                    || (combine_installments
                        && txn.kind == TransactionKind::Installments
                        && plan_reaches_window(txn, start))
            }
        })
        .collect()
}
