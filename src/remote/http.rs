//! SOAP over HTTP, using a blocking `reqwest` client.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::xml::{self, XmlNode};

use super::{soap, QueryParams, RemoteCaller};

/// A [`RemoteCaller`] that posts SOAP envelopes to a gateway URL.
#[derive(Debug)]
pub struct HttpCaller {
    client: Client,
    endpoint: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpCaller {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url_with(&self, params: &QueryParams) -> Url {
        let mut url = self.endpoint.clone();
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn connection_error(&self, error: &reqwest::Error) -> Error {
        Error::Connection {
            endpoint: self.endpoint.to_string(),
            message: error.to_string(),
        }
    }
}

impl RemoteCaller for HttpCaller {
    fn call(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        let method = request.local_name().to_string();
        let body = soap::envelope(request).to_xml_string()?;
        let url = self.url_with(params);
        log::debug!("POST {} ({})", url, method);

        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        let response = builder.send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.connection_error(&e)
            } else {
                Error::Http(e)
            }
        })?;
        let status = response.status();
        let text = response.text()?;

        match xml::parse(&text) {
            Ok(document) => soap::unwrap(&method, &document),
            Err(_) if !status.is_success() => Err(Error::RemoteFault {
                method,
                message: format!("HTTP {}", status),
            }),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}
