//! Request body decoding.
//!
//! JSON bodies parse as-is. Form bodies are flattened to string pairs and run
//! through the same nested decoder as query strings, so `body.items[0]`
//! means the same thing for both encodings.

use crate::error::DecodeError;
use crate::qs;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;

/// How the request body should be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestBodyType {
    #[default]
    Json,
    FormData,
}

/// Decode `body` into one nested value.
pub async fn decode_body(
    body: &Bytes,
    content_type: Option<&str>,
    body_type: RequestBodyType,
) -> Result<Value, DecodeError> {
    match body_type {
        RequestBodyType::Json => Ok(serde_json::from_slice(body)?),
        RequestBodyType::FormData => {
            let pairs = form_pairs(body, content_type).await?;
            let encoded = serde_urlencoded::to_string(&pairs)?;
            Ok(qs::parse_query(&encoded))
        }
    }
}

/// Read a form body as ordered string pairs.
async fn form_pairs(
    body: &Bytes,
    content_type: Option<&str>,
) -> Result<Vec<(String, String)>, DecodeError> {
    let content_type = content_type.unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "multipart/form-data" => multipart_pairs(body, content_type).await,
        "application/x-www-form-urlencoded" => Ok(serde_urlencoded::from_bytes(body)?),
        _ => Err(DecodeError::ContentType(content_type.to_string())),
    }
}

async fn multipart_pairs(
    body: &Bytes,
    content_type: &str,
) -> Result<Vec<(String, String)>, DecodeError> {
    let boundary = multer::parse_boundary(content_type)?;
    // Parse a clone so the request body stays readable by others.
    let chunk = body.clone();
    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(chunk) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut pairs = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            return Err(DecodeError::FileField { name });
        }
        let value = field.text().await?;
        pairs.push((name, value));
    }
    Ok(pairs)
}
