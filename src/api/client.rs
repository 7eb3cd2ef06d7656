use std::time::Duration;

use reqwest::Client;

use crate::prelude::*;

/// Build a client with an in-memory cookie jar, which is where the portal keeps the session.
pub fn try_new() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("greenchoice/", env!("CARGO_PKG_VERSION")))
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build the HTTP client")
}
