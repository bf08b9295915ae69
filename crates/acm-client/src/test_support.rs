// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted transport shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;

use crate::http::{HttpError, HttpRequest, HttpResponse, Transport};

type Route = (Method, String);

/// Replays queued responses per `(method, route)` and records every request.
///
/// The route is the URL path below `/diamond-server`, without query string,
/// e.g. `/diamond` or `/config.co`. A request with nothing queued fails with
/// [`HttpError::Client`].
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<HashMap<Route, VecDeque<Result<HttpResponse, HttpError>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &self,
        method: Method,
        route: &str,
        response: Result<HttpResponse, HttpError>,
    ) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, route.to_string()))
            .or_default()
            .push_back(response);
    }

    pub(crate) fn push_response(&self, method: Method, route: &str, status: u16, body: &str) {
        self.push(method, route, Ok(HttpResponse::new(status, body)));
    }

    pub(crate) fn push_ok(&self, method: Method, route: &str, body: &str) {
        self.push_response(method, route, 200, body);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self, method: Method, route: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && route_of(&request.url) == route)
            .count()
    }

    /// Requests sent to `(method, route)`, oldest first.
    pub(crate) fn requests_to(&self, method: Method, route: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && route_of(&request.url) == route)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        // Give other tasks on a current-thread runtime a chance to run between requests.
        tokio::task::yield_now().await;

        let route = (request.method.clone(), route_of(&request.url).to_string());
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(HttpError::Client(format!(
                "no scripted response for {} {}",
                route.0, route.1
            )))
        })
    }
}

fn route_of(url: &str) -> &str {
    let path = url
        .split_once("/diamond-server")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    path.split('?').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_of_strips_host_and_query() {
        assert_eq!(
            route_of("http://example.com:8080/diamond-server/diamond"),
            "/diamond"
        );
        assert_eq!(
            route_of("http://example.com:8080/diamond-server/diamond-unit-hz?nofix=1"),
            "/diamond-unit-hz"
        );
        assert_eq!(
            route_of("https://10.0.0.1:443/diamond-server/config.co"),
            "/config.co"
        );
    }

    #[tokio::test]
    async fn unscripted_requests_fail() {
        let transport = ScriptedTransport::new();
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1");

        let ok = transport
            .execute(HttpRequest::get("http://e:8080/diamond-server/diamond"))
            .await
            .unwrap();
        assert_eq!(ok.body, "10.0.0.1");

        let err = transport
            .execute(HttpRequest::get("http://e:8080/diamond-server/diamond"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Client(_)));
        assert_eq!(transport.request_count(Method::GET, "/diamond"), 2);
    }
}
