//! Response builders for mocked storage and token endpoints.
//!
//! The storage SDK parses service headers strictly, so every mocked blob
//! response carries the headers a real account returns.
#![expect(dead_code, reason = "each test crate uses a different subset")]

use httpmock::Then;
use serde_json::{Value, json};

const DATE: &str = "Wed, 01 May 2024 12:00:00 GMT";
const ETAG: &str = "\"0x8DC69E3F1A2B3C4\"";

/// Headers present on every storage response.
pub fn storage_headers(then: Then) -> Then {
    then.header("x-ms-request-id", "5c6b1f3e-0001-0000-0000-000000000000")
        .header("x-ms-version", "2022-11-02")
        .header("date", DATE)
}

/// Headers for a successful block or block-list write.
pub fn write_headers(then: Then) -> Then {
    storage_headers(then)
        .header("etag", ETAG)
        .header("last-modified", DATE)
        .header("x-ms-request-server-encrypted", "true")
}

/// Headers for a successful blob delete.
pub fn delete_headers(then: Then) -> Then {
    storage_headers(then).header("x-ms-delete-type-permanent", "true")
}

/// Blob property headers shared by `HEAD` and `GET` on a blob.
pub fn blob_headers(then: Then) -> Then {
    storage_headers(then)
        .header("etag", ETAG)
        .header("last-modified", DATE)
        .header("x-ms-creation-time", DATE)
        .header("content-type", "application/octet-stream")
        .header("x-ms-blob-type", "BlockBlob")
        .header("x-ms-lease-status", "unlocked")
        .header("x-ms-lease-state", "available")
        .header("x-ms-server-encrypted", "true")
        .header("x-ms-access-tier", "Hot")
        .header("x-ms-access-tier-inferred", "true")
        .header("accept-ranges", "bytes")
}

/// A `HEAD` answer for an existing, empty blob.
pub fn blob_properties(then: Then) -> Then {
    blob_headers(then.status(200)).header("content-length", "0")
}

/// A ranged `GET` answer carrying all of `body`.
pub fn blob_download(then: Then, body: &str) -> Then {
    let last = body.len().saturating_sub(1);
    blob_headers(then.status(206))
        .header("content-range", format!("bytes 0-{last}/{}", body.len()))
        .body(body)
}

/// A storage error answer with the service's XML error body.
pub fn storage_error(then: Then, status: u16, code: &str, message: &str) -> Then {
    storage_headers(then.status(status))
        .header("x-ms-error-code", code)
        .header("content-type", "application/xml")
        .body(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{code}</Code><Message>{message}</Message></Error>"
        ))
}

/// One page of a container listing.
pub fn list_page(container: &str, names: &[&str], prefixes: &[&str], next_marker: &str) -> String {
    let blobs: String = names
        .iter()
        .map(|name| {
            format!(
                "<Blob><Name>{name}</Name><Properties>\
                 <Creation-Time>{DATE}</Creation-Time>\
                 <Last-Modified>{DATE}</Last-Modified>\
                 <Etag>{ETAG}</Etag>\
                 <Content-Length>2</Content-Length>\
                 <Content-Type>application/json</Content-Type>\
                 <BlobType>BlockBlob</BlobType>\
                 <AccessTier>Hot</AccessTier>\
                 <AccessTierInferred>true</AccessTierInferred>\
                 <LeaseStatus>unlocked</LeaseStatus>\
                 <LeaseState>available</LeaseState>\
                 <ServerEncrypted>true</ServerEncrypted>\
                 </Properties></Blob>"
            )
        })
        .collect();
    let dirs: String = prefixes
        .iter()
        .map(|name| format!("<BlobPrefix><Name>{name}</Name></BlobPrefix>"))
        .collect();
    let marker = if next_marker.is_empty() {
        "<NextMarker />".to_owned()
    } else {
        format!("<NextMarker>{next_marker}</NextMarker>")
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <EnumerationResults ServiceEndpoint=\"http://localhost/\" ContainerName=\"{container}\">\
         <Blobs>{blobs}{dirs}</Blobs>{marker}</EnumerationResults>"
    )
}

/// A listing answer with `body` as its XML.
pub fn list_response(then: Then, body: String) -> Then {
    storage_headers(then.status(200))
        .header("content-type", "application/xml")
        .body(body)
}

/// A user delegation key answer for `object_id`.
pub fn delegation_key(then: Then, object_id: &str) -> Then {
    storage_headers(then.status(200))
        .header("content-type", "application/xml")
        .body(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><UserDelegationKey>\
             <SignedOid>{object_id}</SignedOid>\
             <SignedTid>00000000-0000-0000-0000-0000000000aa</SignedTid>\
             <SignedStart>2024-05-01T11:55:00Z</SignedStart>\
             <SignedExpiry>2030-05-01T12:00:00Z</SignedExpiry>\
             <SignedService>b</SignedService>\
             <SignedVersion>2022-11-02</SignedVersion>\
             <Value>ZGVsZWdhdGlvbi1rZXktMDEyMzQ1Njc4OQ==</Value>\
             </UserDelegationKey>"
        ))
}

/// Azure AD token endpoint answer.
pub fn aad_token(access_token: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "ext_expires_in": 3599,
        "access_token": access_token,
    })
}
