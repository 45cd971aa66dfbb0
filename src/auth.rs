use crate::schema::{
    Credentials, InstitutionConfig, LogonResponse, ValidateIdDataResponse, RESPONSE_STATUS_OK,
};
use crate::transport::SessionTransport;
use crate::{send_event, ProgressEvent};
use log::{debug, info};
use serde_json::json;
use tokio::sync::mpsc::Sender;

/// Fixed country code the institution expects on every identity request.
pub const COUNTRY_CODE: &str = "212";
/// Fixed id-type discriminator.
pub const ID_TYPE: &str = "1";
/// Fixed validation check level.
pub const CHECK_LEVEL: &str = "1";

const VALIDATION_PROCEED: &str = "1";
const VALIDATION_CHANGE_PASSWORD: &str = "4";
const LOGON_OK: &str = "1";
const LOGON_CHANGE_PASSWORD: &str = "3";

/// States of the login handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Start,
    Navigated,
    Validating,
    /// Identity validated; carries the server-issued username for the logon
    /// request.
    LoggingIn { user_name: String },
    Success,
    ChangePasswordRequired,
    InvalidCredentials,
    /// A response was absent or structurally malformed at some step.
    UnknownError,
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoginState::Success
                | LoginState::ChangePasswordRequired
                | LoginState::InvalidCredentials
                | LoginState::UnknownError
        )
    }
}

/// Terminal result of the handshake, reported to the caller as a value,
/// never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    ChangePasswordRequired,
    InvalidCredentials,
    UnknownError,
}

/// `Validating` transition: requires a successful header and a validation
/// bean, else the handshake cannot proceed at all. Return code "1" moves to
/// the logon stage with the server-issued username, "4" means the password
/// must be changed before any login, anything else is a credential
/// rejection.
pub fn validation_transition(response: Option<&ValidateIdDataResponse>) -> LoginState {
    let Some(response) = response else {
        return LoginState::UnknownError;
    };

    let header_ok = response
        .header
        .as_ref()
        .map(|h| h.status == RESPONSE_STATUS_OK)
        .unwrap_or(false);
    if !header_ok {
        return LoginState::UnknownError;
    }

    let Some(bean) = response.bean.as_ref() else {
        return LoginState::UnknownError;
    };

    match bean.return_code.as_deref() {
        Some(VALIDATION_PROCEED) => match bean.user_name.clone() {
            Some(user_name) => LoginState::LoggingIn { user_name },
            None => LoginState::UnknownError,
        },
        Some(VALIDATION_CHANGE_PASSWORD) => LoginState::ChangePasswordRequired,
        _ => LoginState::InvalidCredentials,
    }
}

/// `LoggingIn` transition: status "1" is success, "3" demands a password
/// change, anything else (including a missing response) counts as rejected
/// credentials.
pub fn logon_transition(response: Option<&LogonResponse>) -> LoginState {
    match response.and_then(|r| r.status.as_deref()) {
        Some(LOGON_OK) => LoginState::Success,
        Some(LOGON_CHANGE_PASSWORD) => LoginState::ChangePasswordRequired,
        _ => LoginState::InvalidCredentials,
    }
}

fn outcome_of(state: &LoginState) -> LoginOutcome {
    match state {
        LoginState::Success => LoginOutcome::Success,
        LoginState::ChangePasswordRequired => LoginOutcome::ChangePasswordRequired,
        LoginState::InvalidCredentials => LoginOutcome::InvalidCredentials,
        _ => LoginOutcome::UnknownError,
    }
}

/// Drive the handshake to a terminal state. Strictly sequential: the month
/// fan-out must not start until this returns, since the session cookies are
/// established here. Exactly one terminal progress event is emitted.
pub async fn login<T: SessionTransport + ?Sized>(
    transport: &T,
    institution: &InstitutionConfig,
    credentials: &Credentials,
    progress: Option<Sender<ProgressEvent>>,
) -> LoginOutcome {
    send_event(&progress, ProgressEvent::LoginAttempt).await;

    let terminal = run_handshake(transport, institution, credentials).await;
    let outcome = outcome_of(&terminal);

    match outcome {
        LoginOutcome::Success => {
            info!("login succeeded");
            send_event(&progress, ProgressEvent::LoginSuccess).await;
        }
        LoginOutcome::ChangePasswordRequired => {
            info!("login requires a password change");
            send_event(&progress, ProgressEvent::ChangePassword).await;
        }
        LoginOutcome::InvalidCredentials | LoginOutcome::UnknownError => {
            info!("login failed: {:?}", outcome);
            send_event(&progress, ProgressEvent::LoginFailed).await;
        }
    }

    outcome
}

async fn run_handshake<T: SessionTransport + ?Sized>(
    transport: &T,
    institution: &InstitutionConfig,
    credentials: &Credentials,
) -> LoginState {
    // Start -> Navigated
    if let Err(e) = transport.navigate(&institution.login_page_url()).await {
        debug!("login page navigation failed: {}", e);
        return LoginState::UnknownError;
    }

    // Navigated -> Validating
    let validate_url = format!("{}?reqName=ValidateIdData", institution.services_url());
    let validate_body = json!({
        "id": credentials.id,
        "cardSuffix": credentials.card_suffix,
        "countryCode": COUNTRY_CODE,
        "idType": ID_TYPE,
        "checkLevel": CHECK_LEVEL,
        "companyCode": institution.company_code,
    });

    let validate_response = transport
        .post_json(&validate_url, &validate_body)
        .await
        .ok()
        .and_then(|raw| serde_json::from_value::<ValidateIdDataResponse>(raw).ok());

    let state = validation_transition(validate_response.as_ref());
    let LoginState::LoggingIn { user_name } = state else {
        return state;
    };

    // LoggingIn -> terminal
    let logon_url = format!("{}?reqName=performLogonI", institution.services_url());
    let logon_body = json!({
        "userName": user_name,
        "id": credentials.id,
        "password": credentials.password,
        "cardSuffix": credentials.card_suffix,
        "countryCode": COUNTRY_CODE,
        "idType": ID_TYPE,
    });

    let logon_response = transport
        .post_json(&logon_url, &logon_body)
        .await
        .ok()
        .and_then(|raw| serde_json::from_value::<LogonResponse>(raw).ok());

    logon_transition(logon_response.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CardHistoryError, Result};
    use crate::schema::{ResponseHeader, ValidateIdDataBean};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn validate_response(
        status: &str,
        return_code: Option<&str>,
        user_name: Option<&str>,
    ) -> ValidateIdDataResponse {
        ValidateIdDataResponse {
            header: Some(ResponseHeader {
                status: status.to_string(),
            }),
            bean: Some(ValidateIdDataBean {
                return_code: return_code.map(str::to_string),
                user_name: user_name.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_validation_proceed_carries_username() {
        let response = validate_response("1", Some("1"), Some("srv-user"));
        assert_eq!(
            validation_transition(Some(&response)),
            LoginState::LoggingIn {
                user_name: "srv-user".to_string()
            }
        );
    }

    #[test]
    fn test_validation_code_4_requires_password_change() {
        let response = validate_response("1", Some("4"), None);
        assert_eq!(
            validation_transition(Some(&response)),
            LoginState::ChangePasswordRequired
        );
    }

    #[test]
    fn test_validation_other_codes_reject_credentials() {
        for code in ["0", "2", "7", "99"] {
            let response = validate_response("1", Some(code), None);
            assert_eq!(
                validation_transition(Some(&response)),
                LoginState::InvalidCredentials
            );
        }
    }

    #[test]
    fn test_validation_structural_failures_are_unknown() {
        assert_eq!(validation_transition(None), LoginState::UnknownError);

        let bad_header = validate_response("0", Some("1"), Some("srv-user"));
        assert_eq!(
            validation_transition(Some(&bad_header)),
            LoginState::UnknownError
        );

        let no_bean = ValidateIdDataResponse {
            header: Some(ResponseHeader {
                status: "1".to_string(),
            }),
            bean: None,
        };
        assert_eq!(
            validation_transition(Some(&no_bean)),
            LoginState::UnknownError
        );

        let no_username = validate_response("1", Some("1"), None);
        assert_eq!(
            validation_transition(Some(&no_username)),
            LoginState::UnknownError
        );
    }

    #[test]
    fn test_logon_transitions() {
        let ok = LogonResponse {
            status: Some("1".to_string()),
        };
        assert_eq!(logon_transition(Some(&ok)), LoginState::Success);

        let change = LogonResponse {
            status: Some("3".to_string()),
        };
        assert_eq!(
            logon_transition(Some(&change)),
            LoginState::ChangePasswordRequired
        );

        let other = LogonResponse {
            status: Some("2".to_string()),
        };
        assert_eq!(logon_transition(Some(&other)), LoginState::InvalidCredentials);

        assert_eq!(logon_transition(None), LoginState::InvalidCredentials);
    }

    /// Transport double scripting POST responses and recording the URLs hit.
    struct ScriptedTransport {
        posts: HashMap<String, Value>,
        hits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionTransport for ScriptedTransport {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.hits.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn get_json(&self, _url: &str) -> Result<Value> {
            Err(CardHistoryError::Transport("unexpected GET".to_string()))
        }

        async fn post_json(&self, url: &str, _body: &Value) -> Result<Value> {
            self.hits.lock().unwrap().push(url.to_string());
            self.posts
                .get(url)
                .cloned()
                .ok_or_else(|| CardHistoryError::Transport(format!("no response for {}", url)))
        }
    }

    fn institution() -> InstitutionConfig {
        InstitutionConfig::new("https://institution.example", "11")
    }

    fn credentials() -> Credentials {
        Credentials {
            id: "123456789".to_string(),
            card_suffix: "123456".to_string(),
            password: "pw".to_string(),
        }
    }

    fn validate_url() -> String {
        format!("{}?reqName=ValidateIdData", institution().services_url())
    }

    fn logon_url() -> String {
        format!("{}?reqName=performLogonI", institution().services_url())
    }

    #[tokio::test]
    async fn test_login_success_flow() {
        let transport = ScriptedTransport {
            posts: [
                (
                    validate_url(),
                    serde_json::json!({
                        "Header": { "Status": "1" },
                        "ValidateIdDataBean": { "returnCode": "1", "userName": "srv-user" }
                    }),
                ),
                (logon_url(), serde_json::json!({ "status": "1" })),
            ]
            .into_iter()
            .collect(),
            hits: Mutex::new(Vec::new()),
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let outcome = login(&transport, &institution(), &credentials(), Some(tx)).await;
        assert_eq!(outcome, LoginOutcome::Success);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![ProgressEvent::LoginAttempt, ProgressEvent::LoginSuccess]
        );
    }

    #[tokio::test]
    async fn test_validation_code_4_never_reaches_logon() {
        // Logon is scripted to succeed; it must not matter.
        let transport = ScriptedTransport {
            posts: [
                (
                    validate_url(),
                    serde_json::json!({
                        "Header": { "Status": "1" },
                        "ValidateIdDataBean": { "returnCode": "4" }
                    }),
                ),
                (logon_url(), serde_json::json!({ "status": "1" })),
            ]
            .into_iter()
            .collect(),
            hits: Mutex::new(Vec::new()),
        };

        let outcome = login(&transport, &institution(), &credentials(), None).await;
        assert_eq!(outcome, LoginOutcome::ChangePasswordRequired);

        let hits = transport.hits.lock().unwrap();
        assert!(!hits.iter().any(|url| url == &logon_url()));
    }

    #[tokio::test]
    async fn test_logon_status_3_requires_password_change() {
        let transport = ScriptedTransport {
            posts: [
                (
                    validate_url(),
                    serde_json::json!({
                        "Header": { "Status": "1" },
                        "ValidateIdDataBean": { "returnCode": "1", "userName": "srv-user" }
                    }),
                ),
                (logon_url(), serde_json::json!({ "status": "3" })),
            ]
            .into_iter()
            .collect(),
            hits: Mutex::new(Vec::new()),
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let outcome = login(&transport, &institution(), &credentials(), Some(tx)).await;
        assert_eq!(outcome, LoginOutcome::ChangePasswordRequired);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![ProgressEvent::LoginAttempt, ProgressEvent::ChangePassword]
        );
    }

    #[tokio::test]
    async fn test_missing_validation_response_is_unknown_error() {
        let transport = ScriptedTransport {
            posts: HashMap::new(),
            hits: Mutex::new(Vec::new()),
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let outcome = login(&transport, &institution(), &credentials(), Some(tx)).await;
        assert_eq!(outcome, LoginOutcome::UnknownError);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![ProgressEvent::LoginAttempt, ProgressEvent::LoginFailed]
        );
    }
}
