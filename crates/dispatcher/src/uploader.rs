// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Batch delivery contract and its HTTP implementation.

use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{CONTENT_ENCODING, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::{Result, error::HttpClientSnafu};

/// Default collection endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.segment.io/v1/import";

/// Why a batch was not delivered.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UploadError {
    /// Network trouble or a server-side problem; the batch is retried later.
    #[snafu(display("Transient upload failure: {message}"))]
    Transient { message: String },

    /// The server refused the batch; retrying it cannot succeed.
    #[snafu(display("Batch rejected with HTTP status {status}"))]
    Rejected { status: u16 },
}

/// Delivers one ordered batch. There is no partial success: either the whole
/// batch was accepted or none of it was.
pub trait Uploader<T>: Send {
    fn upload(&mut self, batch: &[T]) -> std::result::Result<(), UploadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct HttpUploaderConfig {
    #[default(DEFAULT_ENDPOINT.to_string())]
    #[builder(into, default = DEFAULT_ENDPOINT.to_string())]
    pub endpoint:   String,
    /// Sent as the basic auth user name with an empty password.
    #[builder(into)]
    pub write_key:  String,
    #[default(Duration::from_secs(15))]
    #[builder(default = Duration::from_secs(15))]
    #[serde(with = "humantime_serde")]
    pub timeout:    Duration,
    #[builder(into)]
    pub user_agent: Option<String>,
}

/// Request body: `{"batch":[...],"sentAt":"<RFC 3339>"}`, sent gzip-compressed.
#[derive(Debug, Serialize)]
pub struct BatchEnvelope<'a, T> {
    pub batch:   &'a [T],
    #[serde(rename = "sentAt")]
    pub sent_at: DateTime<Utc>,
}

/// Posts batches as JSON over HTTP(S).
#[derive(Debug)]
pub struct HttpUploader {
    client: Client,
    config: HttpUploaderConfig,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }
        let client = builder.build().context(HttpClientSnafu)?;
        Ok(Self { client, config })
    }
}

/// Maps a response status to the upload outcome.
pub fn classify_status(status: StatusCode) -> std::result::Result<(), UploadError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        RejectedSnafu {
            status: status.as_u16(),
        }
        .fail()
    } else {
        TransientSnafu {
            message: format!("server responded with {status}"),
        }
        .fail()
    }
}

/// Serializes the envelope for `batch` as gzip-compressed JSON.
pub fn encode_batch<T: Serialize>(batch: &[T], sent_at: DateTime<Utc>) -> std::io::Result<Vec<u8>> {
    let envelope = BatchEnvelope { batch, sent_at };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, &envelope)?;
    encoder.finish()
}

impl<T: Serialize> Uploader<T> for HttpUploader {
    fn upload(&mut self, batch: &[T]) -> std::result::Result<(), UploadError> {
        let body = encode_batch(batch, Utc::now()).map_err(|err| UploadError::Transient {
            message: format!("failed to encode batch: {err}"),
        })?;
        let compressed = body.len();
        let response = self
            .client
            .post(&self.config.endpoint)
            .basic_auth(&self.config.write_key, Some(""))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body)
            .send()
            .map_err(|err| UploadError::Transient {
                message: err.to_string(),
            })?;

        let status = response.status();
        debug!(
            endpoint = %self.config.endpoint,
            status = status.as_u16(),
            batch = batch.len(),
            bytes = compressed,
            "Batch upload finished"
        );
        classify_status(status)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread,
    };

    use flate2::read::GzDecoder;
    use test_case::test_case;

    use super::*;

    #[test_case(200, None ; "ok")]
    #[test_case(204, None ; "no content")]
    #[test_case(400, Some(true) ; "bad request is rejected")]
    #[test_case(413, Some(true) ; "payload too large is rejected")]
    #[test_case(408, Some(false) ; "request timeout is transient")]
    #[test_case(429, Some(false) ; "rate limit is transient")]
    #[test_case(500, Some(false) ; "server error is transient")]
    #[test_case(503, Some(false) ; "unavailable is transient")]
    fn test_classify_status(code: u16, rejected: Option<bool>) {
        let result = classify_status(StatusCode::from_u16(code).unwrap());
        match (result, rejected) {
            (Ok(()), None) => {}
            (Err(UploadError::Rejected { status }), Some(true)) => assert_eq!(status, code),
            (Err(UploadError::Transient { .. }), Some(false)) => {}
            (other, _) => panic!("unexpected outcome for {code}: {other:?}"),
        }
    }

    fn gunzip_json(body: &[u8]) -> serde_json::Value {
        let mut decoded = String::new();
        GzDecoder::new(body).read_to_string(&mut decoded).unwrap();
        serde_json::from_str(&decoded).unwrap()
    }

    #[test]
    fn test_encode_batch_is_gzipped_envelope() {
        let batch = vec![serde_json::json!({"type": "identify", "userId": "u-1"})];
        let sent_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = encode_batch(&batch, sent_at).unwrap();

        assert_eq!(&body[..2], &[0x1f, 0x8b]);
        let value = gunzip_json(&body);
        assert_eq!(value["batch"][0]["userId"], "u-1");
        assert_eq!(value["sentAt"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_envelope_shape() {
        let batch = vec![serde_json::json!({"type": "track", "event": "Opened"})];
        let envelope = BatchEnvelope {
            batch:   &batch,
            sent_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["batch"][0]["event"], "Opened");
        assert_eq!(value["sentAt"], "2024-05-01T10:00:00Z");
    }

    /// Accepts one request, returns `status` and hands back the request head
    /// and raw body.
    fn serve_once(status: u16) -> (String, thread::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/import", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse::<usize>().unwrap();
                }
                let done = line == "\r\n";
                head.push_str(&line);
                if done {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let response =
                format!("HTTP/1.1 {status} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            (head, body)
        });
        (endpoint, handle)
    }

    #[test]
    fn test_http_upload_posts_envelope_with_basic_auth() {
        let (endpoint, server) = serve_once(200);
        let mut uploader = HttpUploader::new(
            HttpUploaderConfig::builder()
                .endpoint(endpoint)
                .write_key("abc")
                .build(),
        )
        .unwrap();

        let batch = vec![serde_json::json!({"type": "track", "event": "Signed Up"})];
        uploader.upload(batch.as_slice()).unwrap();

        let (head, body) = server.join().unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /v1/import http/1.1"));
        assert!(head.contains("authorization: basic ywjjog=="));
        assert!(head.contains("content-type: application/json"));
        assert!(head.contains("content-encoding: gzip"));

        let value = gunzip_json(&body);
        assert_eq!(value["batch"][0]["event"], "Signed Up");
        assert!(value["sentAt"].is_string());
    }

    #[test]
    fn test_http_upload_maps_rejection() {
        let (endpoint, server) = serve_once(400);
        let mut uploader = HttpUploader::new(
            HttpUploaderConfig::builder()
                .endpoint(endpoint)
                .write_key("abc")
                .build(),
        )
        .unwrap();

        let result = uploader.upload(&[serde_json::json!({"type": "alias"})][..]);
        assert!(matches!(result, Err(UploadError::Rejected { status: 400 })));
        server.join().unwrap();
    }

    #[test]
    fn test_http_upload_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/import", listener.local_addr().unwrap());
        drop(listener);

        let mut uploader = HttpUploader::new(
            HttpUploaderConfig::builder()
                .endpoint(endpoint)
                .write_key("abc")
                .timeout(Duration::from_secs(2))
                .build(),
        )
        .unwrap();
        let result = uploader.upload(&[serde_json::json!({"type": "alias"})][..]);
        assert!(matches!(result, Err(UploadError::Transient { .. })));
    }
}
