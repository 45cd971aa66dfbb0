//! # Card History Builder
//!
//! A library for extracting credit-card transaction history from an
//! institution's session-authenticated, month-indexed reporting endpoints
//! and normalizing it into one canonical ledger per account.
//!
//! ## Core Concepts
//!
//! - **Login handshake**: an explicit state machine (navigate, validate
//!   identity, logon) that must reach a terminal state before any data is
//!   fetched, since the fetches ride on the session it establishes
//! - **Monthly fan-out**: every calendar month in the window is fetched
//!   concurrently over the shared session and merged in chronological order
//! - **Normalization**: raw wire rows become canonical transactions:
//!   placeholder rows dropped, outbound (foreign) fields selected, amounts
//!   negated so purchases are negative, shekel spellings unified
//! - **Installment reconciliation**: multi-month installment legs are
//!   collapsed into the single purchase they belong to, unless the caller
//!   opts out
//!
//! ## Example
//!
//! ```rust,ignore
//! use card_history_builder::*;
//! use chrono::{Local, NaiveDate};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = HttpTransport::new()?;
//!     let institution = InstitutionConfig::new("https://digital.example-card.co.il", "11");
//!     let scraper = CardHistoryScraper::new(transport, institution);
//!
//!     let credentials = Credentials {
//!         id: "123456789".to_string(),
//!         card_suffix: "123456".to_string(),
//!         password: "secret".to_string(),
//!     };
//!     let options = FetchOptions {
//!         start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
//!         combine_installments: false,
//!     };
//!
//!     let now = Local::now().date_naive();
//!     match scraper.scrape(&credentials, &options, now, None).await {
//!         ScrapeOutcome::Success(result) => {
//!             for (account, txns) in &result.accounts {
//!                 println!("{}: {} transactions", account, txns.len());
//!             }
//!         }
//!         ScrapeOutcome::LoginFailed(reason) => eprintln!("login failed: {:?}", reason),
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod reconcile;
pub mod schema;
pub mod transport;
pub mod utils;

pub use aggregate::fetch_history;
pub use auth::{login, LoginOutcome, LoginState};
pub use error::{CardHistoryError, Result};
pub use fetch::{fetch_month_transactions, resolve_accounts, scrape_month};
pub use normalize::{installments_info, normalize_currency, normalize_record, SHEKEL_CURRENCY};
pub use reconcile::{filter_old_transactions, fix_installments};
pub use schema::*;
pub use transport::{HttpTransport, SessionTransport};
pub use utils::*;

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

/// Progress notifications delivered to an optional observer channel.
/// Fire-and-forget: a dropped receiver never stalls the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    LoginAttempt,
    LoginSuccess,
    LoginFailed,
    ChangePassword,
}

pub(crate) async fn send_event(sender: &Option<Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}

/// Outcome of a full scrape: either the merged ledger or the typed reason
/// login did not succeed. Transport problems never surface here raw.
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    Success(ScrapeResult),
    LoginFailed(LoginOutcome),
}

/// One institution session: a transport plus the institution's parameters.
pub struct CardHistoryScraper<T: SessionTransport> {
    transport: T,
    institution: InstitutionConfig,
}

impl<T: SessionTransport> CardHistoryScraper<T> {
    pub fn new(transport: T, institution: InstitutionConfig) -> Self {
        Self {
            transport,
            institution,
        }
    }

    /// Run the login handshake to a terminal outcome.
    pub async fn login(
        &self,
        credentials: &Credentials,
        progress: Option<Sender<ProgressEvent>>,
    ) -> LoginOutcome {
        auth::login(&self.transport, &self.institution, credentials, progress).await
    }

    /// Fetch and merge the transaction window. Assumes a logged-in session;
    /// `now` is passed explicitly so month computation is deterministic.
    pub async fn fetch_history(&self, options: &FetchOptions, now: NaiveDate) -> ScrapeResult {
        aggregate::fetch_history(&self.transport, &self.institution, options, now).await
    }

    /// Login followed by the full history fetch.
    pub async fn scrape(
        &self,
        credentials: &Credentials,
        options: &FetchOptions,
        now: NaiveDate,
        progress: Option<Sender<ProgressEvent>>,
    ) -> ScrapeOutcome {
        match self.login(credentials, progress).await {
            LoginOutcome::Success => {
                info!("login complete, starting history fetch");
                ScrapeOutcome::Success(self.fetch_history(options, now).await)
            }
            failure => ScrapeOutcome::LoginFailed(failure),
        }
    }
}
