#![warn(missing_docs)]

//!
//! Flymock serves canned HTTP responses from a directory of YAML fixtures to the code under
//! test, and lets every request that doesn't match a fixture through to the real client.
//!
//! No server is started and no socket is opened for mocked requests: the interceptor replaces
//! the fetch operation of the HTTP client and answers matched requests with an already
//! completed future.
//!
//! # Getting Started
//!
//! Create one fixture file per host in a directory. The file name is the host, with its port
//! if any, followed by `.yaml`:
//!
//! ```text
//! tests/__mock__/
//!     example.com.yaml
//!     localhost:8080.yaml
//!     demo.json
//! ```
//!
//! Every file holds a list of fixtures:
//!
//! ```yaml
//! - path: /demo               # required, matched exactly
//!   method: GET               # optional, defaults to GET, letter case is ignored
//!   code: 200                 # optional, defaults to 200
//!   headers: {x-custom-id: 7} # optional, names are canonicalized to X-Custom-Id
//!   body: demo.json           # required
//!   body_type: file           # optional: string, file or json
//!
//! - path: /json
//!   body: {code: 2}           # mappings and sequences are served as JSON
//! ```
//!
//! A `file` body is a path relative to the fixture file. A structured body is served as JSON
//! with a `Content-Type: application/json; charset=UTF-8` header, unless the fixture declares
//! its own `Content-Type`.
//!
//! Then start intercepting:
//!
//! ## Example
//!
//! ```no_run
//! use flymock::{Client, Interceptor};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut interceptor = Interceptor::new("tests/__mock__").unwrap();
//!     interceptor.start();
//!
//!     // Served from tests/__mock__/example.com.yaml
//!     let response = Client::new().get("http://example.com/demo").await.unwrap();
//!     assert_eq!(200, response.code());
//!
//!     // Not declared anywhere: performed over the network
//!     let response = Client::new().get("https://www.rust-lang.org/").await.unwrap();
//!
//!     interceptor.stop();
//! }
//! ```
//!
//! # Matching
//!
//! A request matches a fixture when the host and port of its URL name a fixture file, its path
//! equals the fixture path and its method equals the fixture method. The query string is
//! ignored. Paths are compared as they are: `/demo` and `/demo/` are different fixtures.
//!
//! When several fixtures match, the first one declared wins.
//!
//! # Dynamic hooks
//!
//! Hooks adjust matched responses from the test itself. A hook stays registered until the
//! returned guard is dropped and runs on every matched response in the meantime.
//!
//! ## Example
//!
//! ```no_run
//! use flymock::{Client, Interceptor};
//! use serde_json::json;
//!
//! # async fn run() {
//! let mut interceptor = Interceptor::new("tests/__mock__").unwrap();
//! interceptor.start();
//!
//! {
//!     let _patch = interceptor.patch_json(json!({"code": 3}));
//!
//!     // {"code": 3}
//!     let response = Client::new().get("http://example.com/json").await.unwrap();
//! }
//!
//! // {"code": 2} again
//! let response = Client::new().get("http://example.com/json").await.unwrap();
//! # }
//! ```
//!
//! # Bindings
//!
//! `Client::new` and `Interceptor::new` share the process-wide `FetchBinding`, so starting an
//! interceptor affects every client in the process. Tests running in parallel should each use
//! their own binding:
//!
//! ## Example
//!
//! ```no_run
//! use flymock::{Client, FetchBinding, Interceptor, RealFetch};
//!
//! let binding = FetchBinding::new(RealFetch::new());
//! let mut interceptor = Interceptor::with_binding("tests/__mock__", binding.clone()).unwrap();
//! interceptor.start();
//!
//! let client = Client::with_binding(binding);
//! ```
//!
//! # Logging
//!
//! Flymock logs through the `log` crate: loaded fixture files, hits and fallthroughs at
//! `debug` level, hook registrations at `trace` level.
//!

mod client;
mod error;
mod fixture;
mod hooks;
mod interceptor;
mod loader;
mod response;

pub use client::{
    Client, Fetch, FetchBinding, FetchOptions, HttpResponse, RealFetch, Request, Target,
};
pub use error::{Error, ErrorKind};
pub use fixture::{BodyType, FixtureBody, FixtureEntry};
pub use hooks::{Hook, HookGuard};
pub use interceptor::Interceptor;
pub use loader::{FixtureStore, FIXTURE_EXTENSION};
pub use response::{canonical_header_name, Response, JSON_CONTENT_TYPE};
