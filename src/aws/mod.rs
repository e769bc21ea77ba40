//! Minimal AWS plumbing shared by the object store and queue adapters.

pub mod sigv4;

pub use sigv4::{AwsCredentials, SigV4Signer, SigningError};

use reqwest::{Client, Method, RequestBuilder, Url};
use time::OffsetDateTime;

/// Build a request whose headers carry a SigV4 signature over `body`.
pub(crate) fn signed_request(
    client: &Client,
    signer: &SigV4Signer,
    method: Method,
    url: Url,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> RequestBuilder {
    let signature_headers = signer.sign(
        method.as_str(),
        &url,
        headers,
        &body,
        OffsetDateTime::now_utc(),
    );
    let mut request = client.request(method, url);
    for (name, value) in signature_headers {
        request = request.header(name, value);
    }
    if !body.is_empty() {
        request = request.body(body);
    }
    request
}
