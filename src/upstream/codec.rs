//! Binary framing for upstream WebSocket connections.
//!
//! Every frame is `[kind u8][id u64 BE][head_len u32 BE][JSON head][body]`.
//! Kind 1 carries a request to the upstream, kind 2 its response. The ID
//! pairs a response with its request.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub const KIND_REQUEST: u8 = 1;
pub const KIND_RESPONSE: u8 = 2;

const PREFIX_LEN: usize = 1 + 8 + 4;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame of {0} bytes is truncated")]
    Truncated(usize),
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("invalid frame head: {0}")]
    Head(#[from] serde_json::Error),
    #[error("invalid {what} in frame head")]
    Invalid { what: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHead {
    pub method: String,
    /// Path and query.
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request {
        id: u64,
        head: RequestHead,
        body: Bytes,
    },
    Response {
        id: u64,
        head: ResponseHead,
        body: Bytes,
    },
}

impl Frame {
    pub fn id(&self) -> u64 {
        match self {
            Frame::Request { id, .. } | Frame::Response { id, .. } => *id,
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let (kind, id, head, body) = match self {
            Frame::Request { id, head, body } => {
                (KIND_REQUEST, *id, serde_json::to_vec(head)?, body)
            }
            Frame::Response { id, head, body } => {
                (KIND_RESPONSE, *id, serde_json::to_vec(head)?, body)
            }
        };
        let head_len =
            u32::try_from(head.len()).map_err(|_| CodecError::Invalid { what: "head length" })?;

        let mut buf = BytesMut::with_capacity(PREFIX_LEN + head.len() + body.len());
        buf.put_u8(kind);
        buf.put_u64(id);
        buf.put_u32(head_len);
        buf.put_slice(&head);
        buf.put_slice(body);
        Ok(buf.freeze())
    }

    pub fn decode(mut bytes: Bytes) -> Result<Frame, CodecError> {
        let total = bytes.len();
        if total < PREFIX_LEN {
            return Err(CodecError::Truncated(total));
        }
        let kind = bytes.get_u8();
        let id = bytes.get_u64();
        let head_len = bytes.get_u32() as usize;
        if bytes.len() < head_len {
            return Err(CodecError::Truncated(total));
        }
        let head = bytes.split_to(head_len);
        let body = bytes;

        match kind {
            KIND_REQUEST => Ok(Frame::Request {
                id,
                head: serde_json::from_slice(&head)?,
                body,
            }),
            KIND_RESPONSE => Ok(Frame::Response {
                id,
                head: serde_json::from_slice(&head)?,
                body,
            }),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn header_map(pairs: &[(String, String)]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CodecError::Invalid { what: "header name" })?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| CodecError::Invalid { what: "header value" })?;
        headers.append(name, value);
    }
    Ok(headers)
}

impl RequestHead {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().to_string(),
            uri: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            headers: header_pairs(request.headers()),
        }
    }

    pub fn into_request(self, body: Bytes) -> Result<Request<Bytes>, CodecError> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|_| CodecError::Invalid { what: "method" })?;
        let mut request = Request::builder()
            .method(method)
            .uri(self.uri.as_str())
            .body(body)
            .map_err(|_| CodecError::Invalid { what: "uri" })?;
        *request.headers_mut() = header_map(&self.headers)?;
        Ok(request)
    }
}

impl ResponseHead {
    pub fn from_response<B>(response: &Response<B>) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: header_pairs(response.headers()),
        }
    }

    pub fn into_response(self, body: Bytes) -> Result<Response<Bytes>, CodecError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| CodecError::Invalid { what: "status" })?;
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = header_map(&self.headers)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let frame = Frame::Response {
            id: 0x0102,
            head: ResponseHead {
                status: 200,
                headers: vec![],
            },
            body: Bytes::from_static(b"ok"),
        };
        let bytes = frame.encode().unwrap();
        let head = br#"{"status":200,"headers":[]}"#;

        assert_eq!(bytes[0], KIND_RESPONSE);
        assert_eq!(&bytes[1..9], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&bytes[9..13], &(head.len() as u32).to_be_bytes());
        assert_eq!(&bytes[13..13 + head.len()], head);
        assert_eq!(&bytes[13 + head.len()..], b"ok");
        assert_eq!(Frame::decode(bytes).unwrap(), frame);
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            Frame::decode(Bytes::from_static(&[1, 0, 0])),
            Err(CodecError::Truncated(3))
        ));

        let mut bad_kind = vec![9u8];
        bad_kind.extend_from_slice(&7u64.to_be_bytes());
        bad_kind.extend_from_slice(&2u32.to_be_bytes());
        bad_kind.extend_from_slice(b"{}");
        assert!(matches!(
            Frame::decode(Bytes::from(bad_kind)),
            Err(CodecError::UnknownKind(9))
        ));

        let mut short_head = vec![KIND_REQUEST];
        short_head.extend_from_slice(&7u64.to_be_bytes());
        short_head.extend_from_slice(&50u32.to_be_bytes());
        short_head.extend_from_slice(b"{}");
        assert!(matches!(
            Frame::decode(Bytes::from(short_head)),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn request_head_keeps_path_query_and_repeated_headers() {
        let request = Request::builder()
            .method("POST")
            .uri("http://svc.example.com/a/b?x=1")
            .header("accept", "text/plain")
            .header("x-tag", "one")
            .header("x-tag", "two")
            .body(())
            .unwrap();
        let head = RequestHead::from_request(&request);
        assert_eq!(head.uri, "/a/b?x=1");

        let rebuilt = head.into_request(Bytes::from_static(b"payload")).unwrap();
        assert_eq!(rebuilt.method(), Method::POST);
        assert_eq!(rebuilt.uri(), "/a/b?x=1");
        assert_eq!(rebuilt.headers().get_all("x-tag").iter().count(), 2);
        assert_eq!(rebuilt.body().as_ref(), b"payload");
    }

    #[test]
    fn response_head_rejects_bad_status() {
        let head = ResponseHead {
            status: 42,
            headers: vec![],
        };
        assert!(head.into_response(Bytes::new()).is_err());
    }
}
