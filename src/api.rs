pub mod auth;
pub mod client;
pub mod models;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use reqwest::{Response, StatusCode, Url, header::ACCEPT};
use serde::de::DeserializeOwned;

use crate::{
    api::{
        auth::Session,
        models::{MeterReadings, Preferences, Profile, Rates},
    },
    config::{ContractSelector, Credentials},
    error::ApiError,
    prelude::*,
    snapshot::Snapshot,
};

pub const DEFAULT_BASE_URL: &str = "https://mijn.greenchoice.nl";

/// Where the update cycle takes its snapshots from.
#[async_trait]
pub trait SnapshotSource: Send {
    /// Log in and resolve the contract to poll.
    async fn setup(&mut self) -> Result<(), ApiError>;

    async fn fetch_snapshot(&mut self) -> Result<Snapshot, ApiError>;
}

/// Authenticated portal client of a single account.
pub struct Api {
    session: Session,

    /// Contract requested by the user.
    selector: Option<ContractSelector>,

    /// Contract actually polled, resolved once.
    contract: Option<ContractSelector>,
}

impl Api {
    pub fn try_new(
        base_url: Url,
        credentials: Credentials,
        selector: Option<ContractSelector>,
    ) -> Result<Self> {
        let session = Session::new(client::try_new()?, base_url, credentials);
        Ok(Self { session, selector, contract: None })
    }

    #[instrument(skip_all)]
    pub async fn get_preferences(&mut self) -> Result<Option<Preferences>, ApiError> {
        self.get("/api/v2/Preferences/").await
    }

    #[instrument(skip_all)]
    pub async fn get_profiles(&mut self) -> Result<Vec<Profile>, ApiError> {
        let profiles: Vec<Profile> = self.get("/api/v2/Profiles/").await?.unwrap_or_default();
        info!(n_profiles = profiles.len(), "fetched the profiles");
        Ok(profiles)
    }

    /// Contract to poll: either the configured one, or the account's preferred one.
    #[instrument(skip_all)]
    pub async fn resolve_contract(&mut self) -> Result<ContractSelector, ApiError> {
        if let Some(contract) = self.contract {
            return Ok(contract);
        }
        let contract = if let Some(selector) = self.selector {
            let profiles = self.get_profiles().await?;
            if !profiles.iter().any(|profile| profile.selector() == selector) {
                return Err(ApiError::contract_resolution(format!(
                    "contract `{selector}` is not among the account's {} profiles",
                    profiles.len(),
                )));
            }
            selector
        } else {
            self.get_preferences()
                .await?
                .ok_or_else(|| ApiError::contract_resolution("the account has no preferences"))?
                .subject
                .into()
        };
        info!(%contract, "resolved the contract");
        self.contract = Some(contract);
        Ok(contract)
    }

    /// Meter readings of the year, [`MeterReadings::default`] when the portal has none.
    #[instrument(skip_all, fields(contract = %contract, year = year))]
    pub async fn get_meter_readings(
        &mut self,
        contract: ContractSelector,
        year: i32,
    ) -> Result<MeterReadings, ApiError> {
        let path = format!(
            "/api/v2/customers/{}/agreements/{}/meter-readings/{year}/",
            contract.customer_number, contract.agreement_id,
        );
        Ok(self.get(&path).await?.unwrap_or_default())
    }

    #[instrument(skip_all, fields(contract = %contract))]
    pub async fn get_rates(&mut self, contract: ContractSelector) -> Result<Rates, ApiError> {
        let path = format!(
            "/api/v2/customers/{}/agreements/{}/rates",
            contract.customer_number, contract.agreement_id,
        );
        Ok(self.get(&path).await?.unwrap_or_default())
    }

    /// Build the snapshot of the year, or of the previous one if this year has no readings yet.
    pub async fn get_snapshot(&mut self, year: i32) -> Result<Snapshot, ApiError> {
        let contract = self.resolve_contract().await?;
        let mut meter_readings = self.get_meter_readings(contract, year).await?;
        if meter_readings.is_empty() {
            debug!(year, "no readings yet, falling back to the previous year…");
            meter_readings = self.get_meter_readings(contract, year - 1).await?;
        }
        let rates = self.get_rates(contract).await?;
        Ok(Snapshot::new(&meter_readings, &rates))
    }

    /// Send an authenticated `GET`.
    ///
    /// Returns [`None`] when the portal answers with 404.
    /// On session expiry, logs in again and repeats the request exactly once.
    async fn get<T: DeserializeOwned>(&mut self, path: &str) -> Result<Option<T>, ApiError> {
        self.session.ensure_active().await?;
        let mut url = self.session.base_url().clone();
        url.set_path(path);

        let mut response = self.send(path, &url).await?;
        if self.session.is_expired(&response) {
            warn!(path, status = %response.status(), "the session has expired");
            self.session.login().await?;
            response = self.send(path, &url).await?;
            if self.session.is_expired(&response) {
                return Err(ApiError::authentication(format!(
                    "`{path}` rejected a fresh session",
                )));
            }
        }

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "not found");
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|error| ApiError::transport(path, error))?;
        read_json(path, response).await.map(Some)
    }

    async fn send(&self, path: &str, url: &Url) -> Result<Response, ApiError> {
        self.session
            .client()
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| ApiError::transport(path, error))
    }
}

#[async_trait]
impl SnapshotSource for Api {
    async fn setup(&mut self) -> Result<(), ApiError> {
        self.resolve_contract().await?;
        Ok(())
    }

    async fn fetch_snapshot(&mut self) -> Result<Snapshot, ApiError> {
        self.get_snapshot(Local::now().year()).await
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    path: &str,
    response: Response,
) -> Result<T, ApiError> {
    let body = response.bytes().await.map_err(|error| ApiError::transport(path, error))?;
    serde_json::from_slice(&body)
        .map_err(|source| ApiError::MalformedResponse { path: path.to_string(), source })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::sensor::SensorKind;

    const CONTRACT: ContractSelector =
        ContractSelector { customer_number: 2222, agreement_id: 1111 };

    const METER_READINGS_PATH: &str = "/api/v2/customers/2222/agreements/1111/meter-readings/2022/";

    const RATES_PATH: &str = "/api/v2/customers/2222/agreements/1111/rates";

    // language=HTML
    const OIDC_FORM: &str = r#"
        <form method="post" action="/signin-oidc">
            <input type="hidden" name="code" value="C0DE" />
            <input type="hidden" name="scope" value="openid profile" />
            <input type="hidden" name="state" value="STATE" />
            <input type="hidden" name="session_state" value="SESSION" />
        </form>
    "#;

    // language=JSON
    const METER_READINGS: &str = r#"
        [
            {
                "productType": "Stroom",
                "months": [
                    {
                        "month": 5,
                        "readings": [
                            {
                                "readingDate": "2022-05-06T00:00:00",
                                "normalConsumption": 50000.0,
                                "offPeakConsumption": 60000.0,
                                "normalFeedIn": 5000.0,
                                "offPeakFeedIn": 6000.0
                            }
                        ]
                    }
                ]
            },
            {
                "productType": "Gas",
                "months": [
                    {
                        "month": 5,
                        "readings": [ { "readingDate": "2022-05-06T00:00:00", "gas": 10000.0 } ]
                    }
                ]
            }
        ]
    "#;

    // language=JSON
    const RATES: &str = r#"
        {
            "electricity": {
                "rates": {
                    "usageDependentElectricityRates": {
                        "allInDeliverySingleIncludingVat": 0.25,
                        "allInDeliveryLowIncludingVat": 0.2,
                        "allInDeliveryNormalIncludingVat": 0.3,
                        "feedInCompensation": 0.08,
                        "feedInCostIncludingVat": 0.01
                    }
                }
            },
            "gas": {
                "rates": {
                    "usageDependentGasRates": { "allInDeliveryIncludingVat": 0.8 }
                }
            }
        }
    "#;

    fn credentials() -> Credentials {
        Credentials { login: "user@example.com".to_string(), password: "hunter2".to_string() }
    }

    fn api(server: &ServerGuard, selector: Option<ContractSelector>) -> Result<Api> {
        Api::try_new(Url::parse(&server.url())?, credentials(), selector)
    }

    /// Mock the full login flow, expecting it to run `n_logins` times.
    async fn mock_login(server: &mut ServerGuard, n_logins: usize) -> Vec<Mock> {
        vec![
            server
                .mock("GET", "/api/antiforgery")
                .with_body(r#"{"requestToken": "TOKEN"}"#)
                .expect(n_logins)
                .create_async()
                .await,
            server
                .mock("GET", "/")
                .with_status(302)
                .with_header("location", "/Account/Login?ReturnUrl=%2Fconnect%2Fauthorize%3Fclient_id%3Dportal")
                .expect(n_logins)
                .create_async()
                .await,
            server
                .mock("GET", "/Account/Login")
                .match_query(Matcher::Any)
                .with_body("<html></html>")
                .expect(n_logins)
                .create_async()
                .await,
            server
                .mock("POST", "/api/login")
                .match_header("requestverificationtoken", "TOKEN")
                .match_body(Matcher::PartialJson(json!({
                    "username": "user@example.com",
                    "password": "hunter2",
                    "returnUrl": "/connect/authorize?client_id=portal",
                    "rememberMe": true,
                })))
                .with_body(r#"{"redirectUri": "/connect/authorize/callback?client_id=portal"}"#)
                .expect(n_logins)
                .create_async()
                .await,
            server
                .mock("GET", "/connect/authorize/callback")
                .match_query(Matcher::Any)
                .with_body(OIDC_FORM)
                .expect(n_logins)
                .create_async()
                .await,
            server
                .mock("POST", "/signin-oidc")
                .match_body(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("code".to_string(), "C0DE".to_string()),
                    Matcher::UrlEncoded("scope".to_string(), "openid+profile".to_string()),
                    Matcher::UrlEncoded("session_state".to_string(), "SESSION".to_string()),
                ]))
                .with_status(200)
                .expect(n_logins)
                .create_async()
                .await,
        ]
    }

    async fn assert_mocks(mocks: &[Mock]) {
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_get_snapshot_ok() -> Result {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, 1).await;
        let preferences = server
            .mock("GET", "/api/v2/Preferences/")
            .with_body(r#"{"accountId": 1, "subject": {"customerNumber": 2222, "agreementId": 1111}}"#)
            .create_async()
            .await;
        let meter_readings = server
            .mock("GET", METER_READINGS_PATH)
            .with_body(METER_READINGS)
            .expect(2)
            .create_async()
            .await;
        let rates =
            server.mock("GET", RATES_PATH).with_body(RATES).expect(2).create_async().await;

        let mut api = api(&server, None)?;
        let snapshot = api.get_snapshot(2022).await?;
        assert_eq!(snapshot.reading_date, NaiveDate::from_ymd_opt(2022, 5, 6));
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityConsumptionOffPeak).unwrap(), 60000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityConsumptionNormal).unwrap(), 50000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityConsumptionTotal).unwrap(), 110000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityFeedInOffPeak).unwrap(), 6000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityFeedInNormal).unwrap(), 5000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityFeedInTotal).unwrap(), 11000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityPriceSingle).unwrap(), 0.25);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityPriceOffPeak).unwrap(), 0.2);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityPriceNormal).unwrap(), 0.3);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityFeedInCompensation).unwrap(), 0.08);
        assert_abs_diff_eq!(snapshot.value(SensorKind::ElectricityFeedInCost).unwrap(), 0.01);
        assert_abs_diff_eq!(snapshot.value(SensorKind::GasConsumption).unwrap(), 10000.0);
        assert_abs_diff_eq!(snapshot.value(SensorKind::GasPrice).unwrap(), 0.8);

        // The session and the contract are reused:
        assert_eq!(api.get_snapshot(2022).await?, snapshot);

        assert_mocks(&login).await;
        preferences.assert_async().await;
        meter_readings.assert_async().await;
        rates.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_get_snapshot_previous_year_ok() -> Result {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, 1).await;
        let current_year = server
            .mock("GET", "/api/v2/customers/2222/agreements/1111/meter-readings/2023/")
            .with_body("[]")
            .create_async()
            .await;
        let previous_year =
            server.mock("GET", METER_READINGS_PATH).with_body(METER_READINGS).create_async().await;
        let _profiles = server
            .mock("GET", "/api/v2/Profiles/")
            .with_body(r#"[{"customerNumber": 2222, "agreementId": 1111}]"#)
            .create_async()
            .await;
        let _rates = server.mock("GET", RATES_PATH).with_status(404).create_async().await;

        let snapshot = api(&server, Some(CONTRACT))?.get_snapshot(2023).await?;
        assert_eq!(snapshot.reading_date, NaiveDate::from_ymd_opt(2022, 5, 6));
        assert_eq!(snapshot.value(SensorKind::GasConsumption), Some(10000.0));
        current_year.assert_async().await;
        previous_year.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_rates_ok() -> Result {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, 1).await;
        let _preferences = server
            .mock("GET", "/api/v2/Preferences/")
            .with_body(r#"{"subject": {"customerNumber": 2222, "agreementId": 1111}}"#)
            .create_async()
            .await;
        let _meter_readings =
            server.mock("GET", METER_READINGS_PATH).with_body(METER_READINGS).create_async().await;
        let rates = server.mock("GET", RATES_PATH).with_status(404).create_async().await;

        let snapshot = api(&server, None)?.get_snapshot(2022).await?;
        assert_eq!(snapshot.value(SensorKind::ElectricityConsumptionNormal), Some(50000.0));
        assert_eq!(snapshot.value(SensorKind::ElectricityPriceSingle), None);
        assert_eq!(snapshot.value(SensorKind::GasPrice), None);
        rates.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_credentials() -> Result {
        let mut server = Server::new_async().await;
        let _antiforgery = server
            .mock("GET", "/api/antiforgery")
            .with_body(r#"{"requestToken": "TOKEN"}"#)
            .create_async()
            .await;
        let _portal = server.mock("GET", "/").with_body("<html></html>").create_async().await;
        let login = server
            .mock("POST", "/api/login")
            .with_body(r#"{"validationProblemDetails": {"errors": {"": ["Invalid credentials"]}}}"#)
            .create_async()
            .await;

        let result = api(&server, None)?.setup().await;
        assert!(matches!(result, Err(ApiError::Authentication { .. })), "{result:?}");
        login.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_expiry() -> Result {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, 2).await;
        let preferences = server
            .mock("GET", "/api/v2/Preferences/")
            .with_status(403)
            .expect(2)
            .create_async()
            .await;

        let result = api(&server, None)?.setup().await;
        assert!(matches!(result, Err(ApiError::Authentication { .. })), "{result:?}");
        assert_mocks(&login).await;
        preferences.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_single_expiry_ok() -> Result {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, 2).await;
        let expired = server
            .mock("GET", "/api/v2/Preferences/")
            .with_status(302)
            .with_header("location", "/connect/authorize?client_id=portal")
            .expect(1)
            .create_async()
            .await;
        let preferences = server
            .mock("GET", "/api/v2/Preferences/")
            .with_body(r#"{"subject": {"customerNumber": 2222, "agreementId": 1111}}"#)
            .expect(1)
            .create_async()
            .await;
        let authorize = server
            .mock("GET", "/connect/authorize")
            .match_query(Matcher::Any)
            .with_body("<html></html>")
            .expect(1)
            .create_async()
            .await;

        api(&server, None)?.setup().await?;
        assert_mocks(&login).await;
        expired.assert_async().await;
        authorize.assert_async().await;
        preferences.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limited_login_is_transient() -> Result {
        let mut server = Server::new_async().await;
        let antiforgery =
            server.mock("GET", "/api/antiforgery").with_status(429).create_async().await;

        let error = api(&server, None)?.setup().await.unwrap_err();
        assert!(matches!(error, ApiError::Transport { .. }), "{error:?}");
        assert!(error.is_transient());
        antiforgery.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_contract() -> Result {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, 1).await;
        let _profiles = server
            .mock("GET", "/api/v2/Profiles/")
            .with_body(r#"[{"customerNumber": 2222, "agreementId": 1111}]"#)
            .create_async()
            .await;

        let selector = ContractSelector { customer_number: 9999, agreement_id: 1 };
        let result = api(&server, Some(selector))?.setup().await;
        assert!(matches!(result, Err(ApiError::ContractResolution { .. })), "{result:?}");
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_transient() -> Result {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server, 1).await;
        let _preferences =
            server.mock("GET", "/api/v2/Preferences/").with_status(502).create_async().await;

        let error = api(&server, None)?.setup().await.unwrap_err();
        assert!(error.is_transient(), "{error:?}");
        Ok(())
    }
}
