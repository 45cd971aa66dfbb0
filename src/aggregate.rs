use crate::fetch::scrape_month;
use crate::reconcile::filter_old_transactions;
use crate::schema::{FetchOptions, InstitutionConfig, ScrapeResult, Transaction};
use crate::transport::SessionTransport;
use crate::utils::{month_sequence, one_year_before};
use chrono::NaiveDate;
use futures::future::join_all;
use log::info;
use std::collections::BTreeMap;

/// Fetch every month in the window concurrently and merge the results into
/// one ledger per account.
///
/// The window starts at `max(one year before now, requested start)`: history
/// depth is capped at a year even when the caller asks for more. Months are
/// fetched concurrently over the shared session, but merged in the
/// precomputed chronological sequence, never in completion order. A failed
/// month contributes zero transactions instead of aborting the run.
pub async fn fetch_history<T: SessionTransport + ?Sized>(
    transport: &T,
    institution: &InstitutionConfig,
    options: &FetchOptions,
    now: NaiveDate,
) -> ScrapeResult {
    let default_start = one_year_before(now);
    let window_start = options
        .start_date
        .map_or(default_start, |requested| requested.max(default_start));

    let months = month_sequence(window_start, now);
    info!(
        "fetching {} months of history starting {}",
        months.len(),
        window_start
    );

    let services_url = institution.services_url();
    let monthly = join_all(months.iter().map(|&month| {
        scrape_month(transport, &services_url, month, options, window_start)
    }))
    .await;

    // join_all yields results in input order, so the merge follows the month
    // sequence even though the fetches race.
    let mut accounts: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    for ledger in monthly {
        for (account_number, txns) in ledger {
            accounts.entry(account_number).or_default().extend(txns);
        }
    }

    // Same filter the fetcher ran per month, now over each full ledger.
    let accounts = accounts
        .into_iter()
        .map(|(account_number, txns)| {
            let filtered =
                filter_old_transactions(txns, window_start, options.combine_installments);
            (account_number, filtered)
        })
        .collect();

    ScrapeResult {
        success: true,
        accounts,
    }
}
