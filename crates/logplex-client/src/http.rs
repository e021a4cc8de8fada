// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the Logplex transport.

use core::time::Duration;
use tracing::error;

/// Builds the reqwest client used for deliveries.
///
/// An unparsable proxy URL is logged and the client is built without a
/// proxy, so a bad proxy setting degrades to a direct connection instead of
/// failing construction.
pub fn build_client(
    timeout: Option<Duration>,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    match build_client_inner(timeout, https_proxy) {
        Ok(client) => Ok(client),
        Err(e) if https_proxy.is_some() => {
            error!(
                "LOGPLEX | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client_inner(timeout, None)
        }
        Err(e) => Err(e),
    }
}

fn build_client_inner(
    timeout: Option<Duration>,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }

    builder.build()
}
