use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::warn;

use crate::config::RemoteSettings;
use crate::error::{IngestError, Result};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// An authenticated session against the extraction-job API. Created by
/// `login`, passed explicitly to everything that talks to the API, and
/// consumed by `logout` so the token cannot be reused afterwards.
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl Session {
    /// Log in with basic auth and capture the bearer token. A rejected login
    /// is fatal: nothing may submit jobs without a live session.
    pub async fn login(settings: &RemoteSettings) -> Result<Self> {
        let http = reqwest::Client::new();
        let response = http
            .post(format!("{}/login", settings.base_url))
            .basic_auth(&settings.username, Some(&settings.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::Auth(format!(
                "login returned {}. Please double-check your credentials.",
                response.status()
            )));
        }

        let creds: LoginResponse = response.json().await?;
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            token: creds.token,
        })
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Deactivate the token. Failures are logged rather than propagated so a
    /// logout on an error path never masks the original error.
    pub async fn logout(self) {
        match self
            .http
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(status = %response.status(), "logout was not accepted"),
            Err(e) => warn!(error = %e, "logout request failed"),
        }
    }
}
