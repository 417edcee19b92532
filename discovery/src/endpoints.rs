// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Discovers local management endpoints (stub_status and the NGINX Plus
//! API) by enumerating candidate addresses from the configuration and
//! probing them over HTTP.

use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::nginx_conf::{Directive, crawl_until};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 80;
const IPV6_LOOPBACK: &str = "[::1]";
/// The catch-all server_name, never a reachable host.
const DEFAULT_SERVER_NAME: &str = "_";

/// Capability trait for the bounded-timeout HTTP probe. Returns the body of
/// a 200 response; anything else (timeout, non-200, transport error) is
/// None.
pub trait EndpointProber: Send + Sync {
    fn get(&self, url: &str) -> Option<String>;
}

/// ureq-backed prober with a uniform timeout.
pub struct HttpProber {
    agent: ureq::Agent,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        HttpProber {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl EndpointProber for HttpProber {
    fn get(&self, url: &str) -> Option<String> {
        match self.agent.get(url).call() {
            Ok(response) if response.status() == 200 => response.into_string().ok(),
            Ok(response) => {
                debug!("probe {url} returned {}", response.status());
                None
            }
            Err(err) => {
                debug!("probe {url} failed: {err}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveredEndpoints {
    pub stub_status: Option<String>,
    pub plus_api: Option<String>,
}

/// Walks the directive tree probing candidate URLs for `stub_status` and
/// `api` locations. The first candidate that validates wins, in document
/// order; remaining candidates are not tried.
pub fn discover(directives: &[Directive], prober: &dyn EndpointProber) -> DiscoveredEndpoints {
    DiscoveredEndpoints {
        stub_status: crawl_until(directives, &mut |parent, directive| {
            probe_location(parent, directive, "stub_status", prober, is_stub_status_body)
        }),
        plus_api: crawl_until(directives, &mut |parent, directive| {
            probe_location(parent, directive, "api", prober, is_plus_api_body)
        }),
    }
}

fn probe_location(
    parent: Option<&Directive>,
    directive: &Directive,
    marker: &str,
    prober: &dyn EndpointProber,
    validate: fn(&str) -> bool,
) -> Option<String> {
    if directive.name != "location" || !directive.has_child(marker) {
        return None;
    }
    candidate_urls(parent, directive)
        .into_iter()
        .find(|url| prober.get(url).is_some_and(|body| validate(&body)))
}

/// Candidate base URLs for a status/API location, derived from the
/// enclosing server block's direct `listen` and `server_name` children.
fn candidate_urls(server: Option<&Directive>, location: &Directive) -> Vec<String> {
    let path = location_path(location);

    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut extra_hosts: Vec<String> = Vec::new();

    if let Some(server) = server.filter(|s| s.name == "server") {
        for child in &server.children {
            match child.name.as_str() {
                "listen" => {
                    if let Some(token) = child.args.first() {
                        let (listen_host, listen_port) = parse_listen(token);
                        host = listen_host.or(host);
                        port = listen_port.or(port);
                    }
                }
                "server_name" => {
                    extra_hosts.extend(
                        child
                            .args
                            .iter()
                            .filter(|name| name.as_str() != DEFAULT_SERVER_NAME)
                            .cloned(),
                    );
                }
                _ => {}
            }
        }
    }

    let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = port.unwrap_or(DEFAULT_PORT);

    let mut urls = vec![format!("http://{host}:{port}{path}")];
    for extra in extra_hosts {
        let url = format!("http://{extra}:{port}{path}");
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// The probe path is the location's match argument: the second argument
/// for an exact-match location (`location = /x`), the first otherwise.
fn location_path(location: &Directive) -> String {
    let path = match location.args.first().map(String::as_str) {
        Some("=") => location.args.get(1),
        Some(_) => location.args.first(),
        None => None,
    };
    path.cloned().unwrap_or_else(|| "/".to_string())
}

/// Splits a `listen` token into optional host and port parts. A bare
/// numeric token is a port; wildcard and unspecified hosts map to loopback
/// so the probe stays on-host.
fn parse_listen(token: &str) -> (Option<String>, Option<u16>) {
    if token == "::" || token == "::1" {
        return (Some(IPV6_LOOPBACK.to_string()), None);
    }
    if let Ok(port) = token.parse::<u16>() {
        return (None, Some(port));
    }
    if let Some((host_part, port_part)) = token.rsplit_once(':')
        && let Ok(port) = port_part.parse::<u16>()
    {
        return (Some(normalize_host(host_part)), Some(port));
    }
    (Some(normalize_host(token)), None)
}

fn normalize_host(host: &str) -> String {
    match host {
        "" | "*" | "0.0.0.0" => DEFAULT_HOST.to_string(),
        "::" | "::1" | "[::]" | "[::1]" => IPV6_LOOPBACK.to_string(),
        other => other.to_string(),
    }
}

fn is_stub_status_body(body: &str) -> bool {
    body.contains("Active connections") && body.contains("server accepts handled requests")
}

/// The Plus API root answers with its version list, a JSON array of
/// integers.
fn is_plus_api_body(body: &str) -> bool {
    serde_json::from_str::<Vec<i64>>(body).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::nginx_conf::parse_str;
    use crate::test_utils::FakeProber;

    const STUB_STATUS_BODY: &str =
        "Active connections: 1\nserver accepts handled requests\n 5 5 5\n";

    #[test]
    fn test_parse_listen_forms() {
        assert_eq!(parse_listen("80"), (None, Some(80)));
        assert_eq!(
            parse_listen("127.0.0.1:8080"),
            (Some("127.0.0.1".into()), Some(8080))
        );
        assert_eq!(parse_listen("*:8080"), (Some("127.0.0.1".into()), Some(8080)));
        assert_eq!(parse_listen("localhost"), (Some("localhost".into()), None));
        assert_eq!(parse_listen("::"), (Some("[::1]".into()), None));
        assert_eq!(parse_listen("::1"), (Some("[::1]".into()), None));
        assert_eq!(parse_listen("0.0.0.0"), (Some("127.0.0.1".into()), None));
    }

    #[test]
    fn test_location_paths() {
        let dirs = parse_str("location = /basic_status { stub_status; }", "t").unwrap();
        assert_eq!(location_path(&dirs[0]), "/basic_status");

        let dirs = parse_str("location /api/ { api; }", "t").unwrap();
        assert_eq!(location_path(&dirs[0]), "/api/");

        let dirs = parse_str("location { stub_status; }", "t").unwrap();
        assert_eq!(location_path(&dirs[0]), "/");
    }

    #[test]
    fn test_stub_status_discovery() {
        let text = r#"
http {
    server {
        listen 127.0.0.1:8080;
        location = /basic_status { stub_status; }
    }
}
"#;
        let dirs = parse_str(text, "t").unwrap();
        let mut prober = FakeProber::default();
        prober.insert("http://127.0.0.1:8080/basic_status", STUB_STATUS_BODY);

        let endpoints = discover(&dirs, &prober);
        assert_eq!(
            endpoints.stub_status.as_deref(),
            Some("http://127.0.0.1:8080/basic_status")
        );
        assert!(endpoints.plus_api.is_none());
    }

    #[test]
    fn test_plus_api_first_reachable_candidate_wins() {
        // The listen candidate is probed before the server_name candidate,
        // which is unreachable here and must not be selected.
        let text = r#"
http {
    server {
        listen 80;
        server_name example.com;
        location /api/ { api; }
    }
}
"#;
        let dirs = parse_str(text, "t").unwrap();
        let mut prober = FakeProber::default();
        prober.insert("http://127.0.0.1:80/api/", "[1,2,3]");

        let endpoints = discover(&dirs, &prober);
        assert_eq!(endpoints.plus_api.as_deref(), Some("http://127.0.0.1:80/api/"));
    }

    #[test]
    fn test_server_name_candidate_used_when_listen_fails() {
        let text = r#"
server {
    listen 8080;
    server_name status.internal;
    location /status { stub_status; }
}
"#;
        let dirs = parse_str(text, "t").unwrap();
        let mut prober = FakeProber::default();
        prober.insert("http://status.internal:8080/status", STUB_STATUS_BODY);

        let endpoints = discover(&dirs, &prober);
        assert_eq!(
            endpoints.stub_status.as_deref(),
            Some("http://status.internal:8080/status")
        );
    }

    #[test]
    fn test_invalid_bodies_are_rejected() {
        let text = "server { listen 8080; location /status { stub_status; } }";
        let dirs = parse_str(text, "t").unwrap();
        let mut prober = FakeProber::default();
        prober.insert("http://127.0.0.1:8080/status", "<html>not a status page</html>");

        assert!(discover(&dirs, &prober).stub_status.is_none());
    }

    #[test]
    fn test_api_body_must_be_integer_array() {
        assert!(is_plus_api_body("[1,2,3]"));
        assert!(is_plus_api_body("[]"));
        assert!(!is_plus_api_body("{\"version\": 1}"));
        assert!(!is_plus_api_body("[\"one\"]"));
        assert!(!is_plus_api_body("nope"));
    }

    #[test]
    fn test_no_candidates_without_trigger_directive() {
        let text = "server { listen 8080; location / { root /srv; } }";
        let dirs = parse_str(text, "t").unwrap();
        let prober = FakeProber::default();
        let endpoints = discover(&dirs, &prober);
        assert!(endpoints.stub_status.is_none() && endpoints.plus_api.is_none());
    }

    #[test]
    fn test_live_probe_against_local_listener() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let body = "Active connections: 2\nserver accepts handled requests\n 3 3 3\n";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });

        let prober = HttpProber::new(Duration::from_secs(2));
        let body = prober
            .get(&format!("http://127.0.0.1:{port}/status"))
            .expect("local probe should succeed");
        assert!(is_stub_status_body(&body));
        handle.join().unwrap();
    }
}
