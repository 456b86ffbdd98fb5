use async_trait::async_trait;
use log::debug;
use maplit::hashmap;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{cookie::Jar, header::HeaderMap, redirect::Policy, Client};
use serde_json::Value;
use stack_string::{format_sstr, StackString};
use std::sync::Arc;
use time::Date;
use url::Url;

use garmin_lib::{errors::GarminImportError as Error, garmin_config::GarminConfig};

use crate::garmin_connect_source::{DataFetcher, GarminConnectSource};

/// Query parameters the sso signin page expects, fixed by the service.
const SIGNIN_PARAMS: [(&str, &str); 32] = [
    ("clientId", "GarminConnect"),
    ("connectLegalTerms", "true"),
    ("consumeServiceTicket", "false"),
    ("createAccountShown", "true"),
    ("cssUrl", "https://connect.garmin.com/gauth-custom-v1.2-min.css"),
    ("displayNameShown", "false"),
    ("embedWidget", "false"),
    ("gauthHost", "https://sso.garmin.com/sso"),
    ("generateExtraServiceTicket", "true"),
    ("generateNoServiceTicket", "false"),
    ("generateTwoExtraServiceTickets", "false"),
    ("globalOptInChecked", "false"),
    ("globalOptInShown", "true"),
    ("id", "gauth-widget"),
    ("initialFocus", "true"),
    ("locale", "en_US"),
    ("locationPromptShown", "true"),
    ("mobile", "false"),
    ("openCreateAccount", "false"),
    (
        "privacyStatementUrl",
        "https://www.garmin.com/en-US/privacy/connect/",
    ),
    (
        "redirectAfterAccountCreationUrl",
        "https://connect.garmin.com/modern/",
    ),
    (
        "redirectAfterAccountLoginUrl",
        "https://connect.garmin.com/modern/",
    ),
    ("rememberMeChecked", "false"),
    ("rememberMeShown", "true"),
    ("service", "https://connect.garmin.com/modern/"),
    ("showConnectLegalAge", "false"),
    ("showPassword", "true"),
    ("showPrivacyPolicy", "false"),
    ("showTermsOfUse", "false"),
    ("source", "https://connect.garmin.com/signin/"),
    ("useCustomHeader", "false"),
    ("webhost", "https://connect.garmin.com/modern/"),
];

/// Cookie-carrying client logged into garmin connect plus the display name
/// used in per-user endpoint urls.
#[derive(Debug, Clone)]
pub struct GarminConnectSession {
    client: Client,
    ticket_client: Client,
    sso_url: StackString,
    connect_url: StackString,
    display_name: StackString,
}

impl GarminConnectSession {
    /// Unauthenticated session. Both clients share one cookie jar, only the
    /// ticket exchange refuses to follow redirects.
    /// # Errors
    /// Return error if the http clients cannot be built
    pub fn new(config: &GarminConfig) -> Result<Self, Error> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder().cookie_provider(jar.clone()).build()?;
        let ticket_client = Client::builder()
            .cookie_provider(jar)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            ticket_client,
            sso_url: config.garmin_sso_url.trim_end_matches('/').into(),
            connect_url: config.garmin_connect_url.trim_end_matches('/').into(),
            display_name: StackString::new(),
        })
    }

    /// Authenticate and look up the display name.
    /// # Errors
    /// Returns `AuthenticationError` or `ProfileLookupError`
    pub async fn login(config: &GarminConfig, username: &str, password: &str) -> Result<Self, Error> {
        let session = Self::new(config)
            .map_err(|e| Error::AuthenticationError(format_sstr!("client setup failed: {e}")))?;
        session.authenticate(username, password).await?;
        let display_name = session.find_display_name().await?;
        Ok(session.with_display_name(display_name))
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<StackString>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Post the credentials to the sso signin page, then redeem the ticket it
    /// hands back so the session cookies get set.
    /// # Errors
    /// Returns `AuthenticationError` on a non-success status, a transport
    /// failure or a response without ticket
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), Error> {
        self.signin(username, password)
            .await
            .map_err(|e| match e {
                Error::AuthenticationError(_) => e,
                e => Error::AuthenticationError(format_sstr!("{e}")),
            })
    }

    async fn signin(&self, username: &str, password: &str) -> Result<(), Error> {
        let signin_url = format_sstr!("{}/sso/signin", self.sso_url);
        let mut url: Url = signin_url.parse()?;
        url.query_pairs_mut().extend_pairs(SIGNIN_PARAMS);

        let mut headers = HeaderMap::new();
        headers.insert("Referer", signin_url.parse()?);

        let data = hashmap! {
            "username" => username,
            "password" => password,
            "embed" => "false",
        };

        debug!("POST {signin_url}");
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .form(&data)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::AuthenticationError(format_sstr!(
                "signin returned {status}"
            )));
        }
        let body = response.text().await?;
        let ticket = extract_ticket(&body)?;
        debug!("ticket {ticket}");

        let ticket_url: Url = format_sstr!("{}/modern/?ticket={ticket}", self.connect_url).parse()?;
        let response = self
            .ticket_client
            .get(ticket_url)
            .headers(headers)
            .send()
            .await?;
        debug!("ticket exchange returned {}", response.status());
        Ok(())
    }

    /// Read the display name off the logged-in landing page.
    /// # Errors
    /// Returns `ProfileLookupError` if the page cannot be fetched or holds no
    /// display name
    pub async fn find_display_name(&self) -> Result<StackString, Error> {
        let body = self
            .landing_page()
            .await
            .map_err(|e| Error::ProfileLookupError(format_sstr!("{e}")))?;
        extract_display_name(&body)
    }

    async fn landing_page(&self) -> Result<String, Error> {
        let url = format_sstr!("{}/modern/", self.connect_url);
        self.client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(Into::into)
    }

    /// Single GET of one source for one day, decoded as json.
    /// # Errors
    /// Return error on transport failure, non-success status or invalid json
    pub async fn fetch_source(
        &self,
        source: GarminConnectSource,
        date: Date,
    ) -> Result<Value, Error> {
        let url = source
            .endpoint()
            .url(&self.connect_url, &self.display_name, date)?;
        debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl DataFetcher for GarminConnectSession {
    async fn fetch(&self, source: GarminConnectSource, date: Date) -> Result<Value, Error> {
        self.fetch_source(source, date)
            .await
            .map_err(|e| Error::FetchError {
                source_name: source.to_str(),
                message: format_sstr!("{e}"),
            })
    }
}

static TICKET_REG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\?ticket=([^"]*)""#).expect("Bad regex"));
static DISPLAY_NAME_REG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"displayName\\":\\"([^"]*)\\""#).expect("Bad regex"));

/// Pull the service ticket out of the signin response.
/// # Errors
/// Returns `AuthenticationError` if the body carries no ticket, which is what
/// a rejected password looks like
pub fn extract_ticket(body: &str) -> Result<StackString, Error> {
    TICKET_REG
        .captures(body)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().into())
        .ok_or_else(|| Error::AuthenticationError("no ticket in signin response".into()))
}

/// The landing page embeds the user preferences as an escaped json string.
/// # Errors
/// Returns `ProfileLookupError` if no display name is present
pub fn extract_display_name(body: &str) -> Result<StackString, Error> {
    DISPLAY_NAME_REG
        .captures(body)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().into())
        .ok_or_else(|| Error::ProfileLookupError("no displayName in landing page".into()))
}
