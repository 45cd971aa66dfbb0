use crate::normalize::normalize_record;
use crate::reconcile::{filter_old_transactions, fix_installments};
use crate::schema::{
    AccountMonthInfo, CardsTransactionsListResponse, DashboardMonthResponse, FetchOptions,
    ResponseHeader, Transaction, TransactionGroup, RESPONSE_STATUS_OK,
};
use crate::transport::SessionTransport;
use crate::utils::{parse_wire_date, CalendarMonth};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;

fn header_ok(header: &Option<ResponseHeader>) -> bool {
    header
        .as_ref()
        .map(|h| h.status == RESPONSE_STATUS_OK)
        .unwrap_or(false)
}

fn accounts_url(services_url: &str, month: &CalendarMonth) -> String {
    format!(
        "{}?reqName=DashboardMonth&actionCode=0&billingDate={}&format=Json",
        services_url,
        month.billing_date_param()
    )
}

fn transactions_url(services_url: &str, month: &CalendarMonth) -> String {
    format!(
        "{}?reqName=CardsTransactionsList&month={}&year={}&requiredDate=N",
        services_url,
        month.month_param(),
        month.year_param()
    )
}

/// Resolve the cards active in `month` together with that month's billing
/// date. "No accounts this month" is a valid answer, not an error: the card
/// may have been opened later or closed, and a failed or malformed response
/// degrades the same way.
pub async fn resolve_accounts<T: SessionTransport + ?Sized>(
    transport: &T,
    services_url: &str,
    month: CalendarMonth,
) -> Vec<AccountMonthInfo> {
    let url = accounts_url(services_url, &month);
    let raw = match transport.get_json(&url).await {
        Ok(value) => value,
        Err(e) => {
            warn!("dashboard fetch failed for {:?}: {}", month, e);
            return Vec::new();
        }
    };

    let response: DashboardMonthResponse = match serde_json::from_value(raw) {
        Ok(response) => response,
        Err(e) => {
            warn!("dashboard response malformed for {:?}: {}", month, e);
            return Vec::new();
        }
    };

    if !header_ok(&response.header) {
        debug!("dashboard header not OK for {:?}", month);
        return Vec::new();
    }

    let charges = match response.bean.and_then(|bean| bean.cards_charges) {
        Some(charges) => charges,
        None => return Vec::new(),
    };

    charges
        .iter()
        .filter_map(|charge| {
            let index = match charge.card_index.trim().parse() {
                Ok(index) => index,
                Err(_) => {
                    warn!("non-numeric card index '{}', skipping", charge.card_index);
                    return None;
                }
            };
            let processed_date = parse_wire_date(&charge.billing_date)?;
            Some(AccountMonthInfo {
                index,
                account_number: charge.card_number.clone(),
                processed_date,
            })
        })
        .collect()
}

/// Fetch and normalize one month of transactions for the resolved accounts.
///
/// Per account, the response groups are read by card index; each group's
/// domestic list precedes its abroad list, and group order is preserved.
/// When installment collapsing is on (`combine_installments` false) the
/// month-local list is reconciled before the window filter runs. An absent
/// per-account entry or a failed response contributes nothing for the month.
pub async fn fetch_month_transactions<T: SessionTransport + ?Sized>(
    transport: &T,
    services_url: &str,
    month: CalendarMonth,
    accounts: &[AccountMonthInfo],
    options: &FetchOptions,
    window_start: NaiveDate,
) -> BTreeMap<String, Vec<Transaction>> {
    let mut ledger = BTreeMap::new();
    if accounts.is_empty() {
        return ledger;
    }

    let url = transactions_url(services_url, &month);
    let raw = match transport.get_json(&url).await {
        Ok(value) => value,
        Err(e) => {
            warn!("transactions fetch failed for {:?}: {}", month, e);
            return ledger;
        }
    };

    let response: CardsTransactionsListResponse = match serde_json::from_value(raw) {
        Ok(response) => response,
        Err(e) => {
            warn!("transactions response malformed for {:?}: {}", month, e);
            return ledger;
        }
    };

    if !header_ok(&response.header) {
        debug!("transactions header not OK for {:?}", month);
        return ledger;
    }

    let Some(bean) = response.bean else {
        return ledger;
    };

    for account in accounts {
        let groups_value = bean
            .get(format!("Index{}", account.index))
            .and_then(|entry| entry.get("CurrentCardTransactions"));

        let Some(groups_value) = groups_value else {
            debug!(
                "account {} has no entry for {:?}",
                account.account_number, month
            );
            continue;
        };

        let groups: Vec<TransactionGroup> = match serde_json::from_value(groups_value.clone()) {
            Ok(groups) => groups,
            Err(e) => {
                warn!(
                    "transaction groups malformed for account {}: {}",
                    account.account_number, e
                );
                continue;
            }
        };

        let mut txns: Vec<Transaction> = Vec::new();
        for group in &groups {
            if let Some(domestic) = &group.txn_israel {
                txns.extend(
                    domestic
                        .iter()
                        .filter_map(|record| normalize_record(record, account.processed_date)),
                );
            }
            if let Some(abroad) = &group.txn_abroad {
                txns.extend(
                    abroad
                        .iter()
                        .filter_map(|record| normalize_record(record, account.processed_date)),
                );
            }
        }

        if !options.combine_installments {
            txns = fix_installments(txns);
        }
        txns = filter_old_transactions(txns, window_start, options.combine_installments);

        debug!(
            "account {} {:?}: {} transactions",
            account.account_number,
            month,
            txns.len()
        );
        ledger.insert(account.account_number.clone(), txns);
    }

    ledger
}

/// Resolve accounts for `month` and fetch their transactions in one step.
pub async fn scrape_month<T: SessionTransport + ?Sized>(
    transport: &T,
    services_url: &str,
    month: CalendarMonth,
    options: &FetchOptions,
    window_start: NaiveDate,
) -> BTreeMap<String, Vec<Transaction>> {
    let accounts = resolve_accounts(transport, services_url, month).await;
    fetch_month_transactions(transport, services_url, month, &accounts, options, window_start)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CardHistoryError, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Transport double answering GETs from a fixed url → payload table.
    struct TableTransport {
        responses: HashMap<String, Value>,
    }

    #[async_trait]
    impl SessionTransport for TableTransport {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn get_json(&self, url: &str) -> Result<Value> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| CardHistoryError::Transport(format!("no response for {}", url)))
        }

        async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value> {
            Err(CardHistoryError::Transport("unexpected POST".to_string()))
        }
    }

    const SERVICES: &str = "https://institution.example/services/ProcessRequest.aspx";

    fn month() -> CalendarMonth {
        CalendarMonth { year: 2026, month: 3 }
    }

    fn dashboard_payload() -> Value {
        json!({
            "Header": { "Status": "1" },
            "DashboardMonthBean": {
                "cardsCharges": [
                    { "cardIndex": "0", "cardNumber": "1234", "billingDate": "02/03/2026" },
                    { "cardIndex": "1", "cardNumber": "5678", "billingDate": "10/03/2026" }
                ]
            }
        })
    }

    fn transactions_payload() -> Value {
        json!({
            "Header": { "Status": "1" },
            "CardsTransactionsListBean": {
                "Index0": {
                    "CurrentCardTransactions": [
                        {
                            "txnIsrael": [
                                {
                                    "dealSumType": "0",
                                    "voucherNumberRatz": "111111111",
                                    "currencyId": "שקל",
                                    "dealSum": 100.0,
                                    "paymentSum": 100.0,
                                    "fullPurchaseDate": "04/03/2026",
                                    "fullSupplierNameHeb": "מכולת"
                                }
                            ],
                            "txnAbroad": [
                                {
                                    "dealSumType": "0",
                                    "voucherNumberRatz": "000000000",
                                    "voucherNumberRatzOutbound": "222222222",
                                    "isOutbound": true,
                                    "currencyId": "USD",
                                    "dealSumOutbound": 30.0,
                                    "paymentSumOutbound": 110.0,
                                    "fullPurchaseDateOutbound": "05/03/2026",
                                    "fullSupplierNameOutbound": "Foreign Store"
                                }
                            ]
                        }
                    ]
                }
            }
        })
    }

    fn table(entries: Vec<(String, Value)>) -> TableTransport {
        TableTransport {
            responses: entries.into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_resolve_accounts_maps_charges() {
        let transport = table(vec![(
            accounts_url(SERVICES, &month()),
            dashboard_payload(),
        )]);

        let accounts = resolve_accounts(&transport, SERVICES, month()).await;
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].index, 0);
        assert_eq!(accounts[0].account_number, "1234");
        assert_eq!(
            accounts[0].processed_date,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert_eq!(accounts[1].index, 1);
    }

    #[tokio::test]
    async fn test_resolve_accounts_degrades_to_empty() {
        // Transport failure
        let transport = table(vec![]);
        assert!(resolve_accounts(&transport, SERVICES, month()).await.is_empty());

        // Failing header
        let transport = table(vec![(
            accounts_url(SERVICES, &month()),
            json!({ "Header": { "Status": "0" } }),
        )]);
        assert!(resolve_accounts(&transport, SERVICES, month()).await.is_empty());

        // Missing bean
        let transport = table(vec![(
            accounts_url(SERVICES, &month()),
            json!({ "Header": { "Status": "1" } }),
        )]);
        assert!(resolve_accounts(&transport, SERVICES, month()).await.is_empty());
    }

    #[tokio::test]
    async fn test_scrape_month_domestic_before_abroad() {
        let transport = table(vec![
            (accounts_url(SERVICES, &month()), dashboard_payload()),
            (transactions_url(SERVICES, &month()), transactions_payload()),
        ]);

        let options = FetchOptions::default();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let ledger = scrape_month(&transport, SERVICES, month(), &options, start).await;

        let txns = ledger.get("1234").unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].identifier, 111111111);
        assert_eq!(txns[0].original_currency, "ILS");
        assert_eq!(txns[1].identifier, 222222222);
        assert_eq!(txns[1].charged_amount, -110.0);

        // Account 5678 resolved but has no Index1 entry: contributes nothing.
        assert!(ledger.get("5678").is_none());
    }

    #[tokio::test]
    async fn test_scrape_month_failed_transactions_response() {
        let transport = table(vec![(
            accounts_url(SERVICES, &month()),
            dashboard_payload(),
        )]);

        let options = FetchOptions::default();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let ledger = scrape_month(&transport, SERVICES, month(), &options, start).await;
        assert!(ledger.is_empty());
    }
}
