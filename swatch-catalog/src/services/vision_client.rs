//! Google Cloud Vision client
//!
//! Requests the `IMAGE_PROPERTIES` feature for an image URI and reports the
//! highest-scoring entry of the returned dominant colors.
//!
//! Vision fetches the image itself. When the image host is slow or briefly
//! unreachable Vision answers with a per-image error rather than an HTTP
//! error; those are reported as transient so the pipeline retries them.

use super::color_extractor::{ColorError, ColorExtractor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use swatch_common::config::VisionConfig;
use swatch_common::Rgb;

const USER_AGENT: &str = concat!("swatch-catalog/", env!("CARGO_PKG_VERSION"));

/// gRPC status codes Vision uses for failures that may clear up on retry
const RETRYABLE_STATUS_CODES: [i32; 4] = [
    4,  // DEADLINE_EXCEEDED
    8,  // RESOURCE_EXHAUSTED
    13, // INTERNAL
    14, // UNAVAILABLE
];

/// Message fragments Vision reports when it could not fetch the image URI
const FETCH_FAILURE_MARKERS: [&str; 3] = [
    "access the url",
    "download the content",
    "error opening file",
];

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: [ImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    image: ImageSpec<'a>,
    features: [Feature; 1],
}

#[derive(Debug, Serialize)]
struct ImageSpec<'a> {
    source: ImageSource<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSource<'a> {
    image_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// `images:annotate` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotateResponse {
    #[serde(default)]
    pub responses: Vec<ImageResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_properties_annotation: Option<ImageProperties>,
    pub error: Option<VisionStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    pub dominant_colors: Option<DominantColors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DominantColors {
    #[serde(default)]
    pub colors: Vec<ColorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    #[serde(default)]
    pub color: VisionColor,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub pixel_fraction: f64,
}

/// Channel values arrive as floats in [0, 255]; zero channels are omitted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisionColor {
    #[serde(default)]
    pub red: f64,
    #[serde(default)]
    pub green: f64,
    #[serde(default)]
    pub blue: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisionStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl VisionStatus {
    fn into_error(self) -> ColorError {
        let message = format!("Vision error {}: {}", self.code, self.message);
        let lowered = self.message.to_lowercase();
        let fetch_failure = FETCH_FAILURE_MARKERS.iter().any(|m| lowered.contains(m));

        if fetch_failure || RETRYABLE_STATUS_CODES.contains(&self.code) {
            ColorError::Transient(message)
        } else {
            ColorError::Permanent(message)
        }
    }
}

/// Pick the dominant color out of an annotate response
pub fn dominant_color(response: AnnotateResponse) -> Result<Rgb, ColorError> {
    let image = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| ColorError::Permanent("Empty Vision response".to_string()))?;

    if let Some(status) = image.error {
        return Err(status.into_error());
    }

    let best = image
        .image_properties_annotation
        .and_then(|a| a.dominant_colors)
        .and_then(|d| {
            d.colors
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
        })
        .ok_or_else(|| ColorError::Permanent("No dominant color in Vision response".to_string()))?;

    Ok(Rgb::new(
        channel(best.color.red)?,
        channel(best.color.green)?,
        channel(best.color.blue)?,
    ))
}

fn channel(value: f64) -> Result<u8, ColorError> {
    if !value.is_finite() || !(0.0..=255.0).contains(&value) {
        return Err(ColorError::Permanent(format!(
            "Color channel out of range: {}",
            value
        )));
    }
    Ok(value.round() as u8)
}

/// Scheme-less references (`//cdn.example/img.jpg`) are fetched over HTTPS
pub fn normalize_image_uri(image_reference: &str) -> String {
    match image_reference.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => image_reference.to_string(),
    }
}

/// Google Cloud Vision API client
pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl VisionClient {
    /// Create new Vision client
    pub fn new(config: &VisionConfig, api_key: impl Into<String>) -> Result<Self, ColorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ColorError::Permanent(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
        })
    }

    /// Run one `images:annotate` request for the image
    pub async fn annotate(&self, image_uri: &str) -> Result<AnnotateResponse, ColorError> {
        let body = AnnotateRequest {
            requests: [ImageRequest {
                image: ImageSpec {
                    source: ImageSource { image_uri },
                },
                features: [Feature {
                    kind: "IMAGE_PROPERTIES",
                }],
            }],
        };

        tracing::debug!(image_uri, "Querying Vision API");

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ColorError::Transient(format!("Network error: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ColorError::Transient(format!(
                "API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ColorError::Permanent(format!(
                "API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ColorError::Permanent(format!("Parse error: {}", e)))
    }
}

#[async_trait]
impl ColorExtractor for VisionClient {
    fn name(&self) -> &'static str {
        "google-vision"
    }

    async fn extract_dominant_color(&self, image_reference: &str) -> Result<Rgb, ColorError> {
        let image_uri = normalize_image_uri(image_reference);
        let response = self.annotate(&image_uri).await?;
        let rgb = dominant_color(response)?;

        tracing::debug!(image_uri = %image_uri, color = %rgb, "Vision dominant color");
        Ok(rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AnnotateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = VisionClient::new(&VisionConfig::default(), "key");
        assert!(client.is_ok());
    }

    #[test]
    fn test_picks_highest_score() {
        let response = parse(
            r#"{"responses":[{"imagePropertiesAnnotation":{"dominantColors":{"colors":[
                {"color":{"red":10,"green":20,"blue":30},"score":0.2,"pixelFraction":0.5},
                {"color":{"red":200,"green":100.4,"blue":0.6},"score":0.7,"pixelFraction":0.1},
                {"color":{"red":1,"green":1,"blue":1},"score":0.1,"pixelFraction":0.4}
            ]}}}]}"#,
        );

        assert_eq!(dominant_color(response), Ok(Rgb::new(200, 100, 1)));
    }

    #[test]
    fn test_omitted_channels_are_zero() {
        let response = parse(
            r#"{"responses":[{"imagePropertiesAnnotation":{"dominantColors":{"colors":[
                {"color":{"blue":255},"score":0.9}
            ]}}}]}"#,
        );

        assert_eq!(dominant_color(response), Ok(Rgb::new(0, 0, 255)));
    }

    #[test]
    fn test_unreachable_image_is_transient() {
        let response = parse(
            r#"{"responses":[{"error":{"code":7,"message":"We can not access the URL currently. Please download the content and pass it in."}}]}"#,
        );

        assert!(dominant_color(response).unwrap_err().is_transient());
    }

    #[test]
    fn test_unavailable_status_is_transient() {
        let response = parse(r#"{"responses":[{"error":{"code":14,"message":"try later"}}]}"#);
        assert!(dominant_color(response).unwrap_err().is_transient());
    }

    #[test]
    fn test_bad_image_is_permanent() {
        let response = parse(r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#);
        assert!(matches!(dominant_color(response), Err(ColorError::Permanent(_))));
    }

    #[test]
    fn test_missing_annotation_is_permanent() {
        assert!(matches!(
            dominant_color(parse(r#"{"responses":[{}]}"#)),
            Err(ColorError::Permanent(_))
        ));
        assert!(matches!(
            dominant_color(parse(r#"{"responses":[]}"#)),
            Err(ColorError::Permanent(_))
        ));
    }

    #[test]
    fn test_out_of_range_channel_is_permanent() {
        let response = parse(
            r#"{"responses":[{"imagePropertiesAnnotation":{"dominantColors":{"colors":[
                {"color":{"red":300,"green":0,"blue":0},"score":1.0}
            ]}}}]}"#,
        );
        assert!(matches!(dominant_color(response), Err(ColorError::Permanent(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let body = AnnotateRequest {
            requests: [ImageRequest {
                image: ImageSpec {
                    source: ImageSource {
                        image_uri: "https://img.example/a.jpg",
                    },
                },
                features: [Feature {
                    kind: "IMAGE_PROPERTIES",
                }],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value["requests"][0]["image"]["source"]["imageUri"],
            "https://img.example/a.jpg"
        );
        assert_eq!(value["requests"][0]["features"][0]["type"], "IMAGE_PROPERTIES");
    }

    #[test]
    fn test_normalize_image_uri() {
        assert_eq!(
            normalize_image_uri("//image1.example.com/img/a.jpg"),
            "https://image1.example.com/img/a.jpg"
        );
        assert_eq!(normalize_image_uri("http://x/y.png"), "http://x/y.png");
    }
}
