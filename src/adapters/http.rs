//! HTTP client adapter.
//!
//! - **`target_os = "espidf"`**: [`EspHttp`] wraps `EspHttpConnection`
//!   with the mbedTLS certificate bundle, so HTTPS to GitHub and firmware
//!   hosts works without pinning certificates.
//! - **all other targets**: [`SimHttp`] serves canned responses keyed by
//!   URL and records every request for host-side tests.

use crate::app::ports::{HttpPort, HttpResponse};
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_svc::http::Method;
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection, FollowRedirectsPolicy};
    use log::{debug, warn};

    use super::{HttpPort, HttpResponse, TransportError};

    const BUFFER_SIZE: usize = 2048;
    const TIMEOUT: Duration = Duration::from_secs(20);

    /// One connection per request; the previous one is dropped on the next
    /// `get`.
    #[derive(Default)]
    pub struct EspHttp {
        conn: Option<EspHttpConnection>,
    }

    impl EspHttp {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl HttpPort for EspHttp {
        fn get<'a>(
            &'a mut self,
            url: &str,
            headers: &[(&str, &str)],
        ) -> Result<Box<dyn HttpResponse + 'a>, TransportError> {
            self.conn = None;
            let mut conn = EspHttpConnection::new(&Configuration {
                buffer_size: Some(BUFFER_SIZE),
                buffer_size_tx: Some(1024),
                timeout: Some(TIMEOUT),
                follow_redirects_policy: FollowRedirectsPolicy::FollowAll,
                crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
                ..Default::default()
            })
            .map_err(|e| {
                warn!("http: client init failed: {e}");
                TransportError::Connect
            })?;

            debug!("http: GET {url}");
            conn.initiate_request(Method::Get, url, headers)
                .and_then(|()| conn.initiate_response())
                .map_err(|e| {
                    warn!("http: GET {url} failed: {e}");
                    TransportError::Connect
                })?;

            let conn = self.conn.insert(conn);
            Ok(Box::new(EspResponse { conn }))
        }
    }

    struct EspResponse<'a> {
        conn: &'a mut EspHttpConnection,
    }

    impl HttpResponse for EspResponse<'_> {
        fn status(&self) -> u16 {
            self.conn.status()
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            self.conn.read(buf).map_err(|e| {
                warn!("http: body read failed: {e}");
                TransportError::Read
            })
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspHttp;

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::HashMap;

    use super::{HttpPort, HttpResponse, TransportError};

    /// Bytes handed out per `read` call, smaller than the engines' buffers
    /// so chunk boundaries get exercised.
    const DEFAULT_CHUNK: usize = 700;

    #[derive(Debug, Clone)]
    struct Route {
        status: u16,
        body: Vec<u8>,
        /// Body reads fail once this many bytes have been served.
        fail_after: Option<usize>,
    }

    /// A recorded request.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SimRequest {
        pub url: String,
        pub headers: Vec<(String, String)>,
    }

    /// Canned HTTP responses. Unknown URLs answer 404.
    #[derive(Debug, Default)]
    pub struct SimHttp {
        routes: HashMap<String, Route>,
        unreachable: Vec<String>,
        requests: Vec<SimRequest>,
        chunk: usize,
    }

    impl SimHttp {
        pub fn new() -> Self {
            Self {
                chunk: DEFAULT_CHUNK,
                ..Self::default()
            }
        }

        /// Serve `body` with `status` at `url`.
        pub fn route(&mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> &mut Self {
            self.routes.insert(
                url.to_owned(),
                Route {
                    status,
                    body: body.into(),
                    fail_after: None,
                },
            );
            self
        }

        /// Answer 200 but break the body stream after `fail_after` bytes.
        pub fn route_broken(
            &mut self,
            url: &str,
            body: impl Into<Vec<u8>>,
            fail_after: usize,
        ) -> &mut Self {
            self.routes.insert(
                url.to_owned(),
                Route {
                    status: 200,
                    body: body.into(),
                    fail_after: Some(fail_after),
                },
            );
            self
        }

        /// Refuse connections to `url`.
        pub fn unreachable(&mut self, url: &str) -> &mut Self {
            self.unreachable.push(url.to_owned());
            self
        }

        pub fn requests(&self) -> &[SimRequest] {
            &self.requests
        }

        pub fn was_requested(&self, url: &str) -> bool {
            self.requests.iter().any(|r| r.url == url)
        }
    }

    impl HttpPort for SimHttp {
        fn get<'a>(
            &'a mut self,
            url: &str,
            headers: &[(&str, &str)],
        ) -> Result<Box<dyn HttpResponse + 'a>, TransportError> {
            self.requests.push(SimRequest {
                url: url.to_owned(),
                headers: headers
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
            });
            if self.unreachable.iter().any(|u| u == url) {
                return Err(TransportError::Connect);
            }
            let route = self.routes.get(url).cloned().unwrap_or(Route {
                status: 404,
                body: br#"{"message":"Not Found"}"#.to_vec(),
                fail_after: None,
            });
            Ok(Box::new(SimResponse {
                route,
                pos: 0,
                chunk: self.chunk.max(1),
            }))
        }
    }

    struct SimResponse {
        route: Route,
        pos: usize,
        chunk: usize,
    }

    impl HttpResponse for SimResponse {
        fn status(&self) -> u16 {
            self.route.status
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.route.fail_after.is_some_and(|limit| self.pos >= limit) {
                return Err(TransportError::Read);
            }
            let remaining = &self.route.body[self.pos..];
            let mut n = remaining.len().min(buf.len()).min(self.chunk);
            if let Some(limit) = self.route.fail_after {
                n = n.min(limit - self.pos);
            }
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }

}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimHttp, SimRequest};
