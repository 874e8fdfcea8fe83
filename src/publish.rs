//! Sharing stored images to social platforms.
//!
//! Request validation is always available. The HTTP client against the
//! Facebook Graph API is built with the `publish` feature; without it every
//! share is refused with `PublishError::Disabled`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Graph API root used for both platforms.
pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v13.0/";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Missing required fields")]
    InvalidRequest,

    #[error("Unsupported platform")]
    UnsupportedPlatform(String),

    #[error("{0} credentials are not configured")]
    NotConfigured(Platform),

    #[error("publishing is not enabled in this build")]
    Disabled,

    #[error("Failed to share to {platform}: {reason}")]
    Failed { platform: Platform, reason: String },
}

impl PublishError {
    /// Caller errors map to 400, everything else to 500.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PublishError::InvalidRequest | PublishError::UnsupportedPlatform(_)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Facebook,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Facebook => write!(f, "Facebook"),
            Platform::Instagram => write!(f, "Instagram"),
        }
    }
}

/// Body of a share request. Missing fields deserialize as empty.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShareRequest {
    pub platform: String,
    pub image_url: String,
    pub caption: String,
}

/// A validated share request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    pub platform: Platform,
    /// Absolute URL the platform fetches the image from.
    pub image_url: String,
    pub caption: String,
}

impl ShareRequest {
    /// Validate and resolve `image_url` against `public_base` (e.g. `http://host:5000`).
    pub fn validate(&self, public_base: &str) -> Result<Share, PublishError> {
        let platform = self.platform.trim();
        let image_url = self.image_url.trim();
        if platform.is_empty() || image_url.is_empty() {
            return Err(PublishError::InvalidRequest);
        }
        let platform = match platform {
            "facebook" => Platform::Facebook,
            "instagram" => Platform::Instagram,
            other => return Err(PublishError::UnsupportedPlatform(other.to_string())),
        };
        Ok(Share {
            platform,
            image_url: absolute_url(public_base, image_url),
            caption: self.caption.clone(),
        })
    }
}

/// Prefix site-relative paths with `public_base`; absolute URLs pass through.
pub fn absolute_url(public_base: &str, image_url: &str) -> String {
    if image_url.starts_with("http://") || image_url.starts_with("https://") {
        return image_url.to_string();
    }
    format!(
        "{}/{}",
        public_base.trim_end_matches('/'),
        image_url.trim_start_matches('/')
    )
}

/// Page and account credentials for the Graph API. Empty means unset.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SocialCredentials {
    pub facebook_page_id: String,
    pub facebook_access_token: String,
    pub instagram_account_id: String,
    pub instagram_access_token: String,
}

impl std::fmt::Debug for SocialCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialCredentials")
            .field("facebook_page_id", &self.facebook_page_id)
            .field("facebook_access_token", &redacted(&self.facebook_access_token))
            .field("instagram_account_id", &self.instagram_account_id)
            .field("instagram_access_token", &redacted(&self.instagram_access_token))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl SocialCredentials {
    /// (target id, access token) for `platform`, if both are set.
    pub fn for_platform(&self, platform: Platform) -> Result<(&str, &str), PublishError> {
        let (id, token) = match platform {
            Platform::Facebook => (&self.facebook_page_id, &self.facebook_access_token),
            Platform::Instagram => (&self.instagram_account_id, &self.instagram_access_token),
        };
        if id.is_empty() || token.is_empty() {
            return Err(PublishError::NotConfigured(platform));
        }
        Ok((id, token))
    }
}

/// Delivers a validated share to its platform.
pub trait Publisher: Send + Sync {
    fn publish(&self, share: &Share) -> Result<(), PublishError>;
}

/// Publisher used when the crate is built without `publish`.
pub struct DisabledPublisher;

impl Publisher for DisabledPublisher {
    fn publish(&self, share: &Share) -> Result<(), PublishError> {
        log::warn!("share to {} refused: publishing disabled", share.platform);
        Err(PublishError::Disabled)
    }
}

#[cfg(feature = "publish")]
pub use graph::GraphPublisher;

#[cfg(feature = "publish")]
mod graph {
    use url::Url;

    use super::{Platform, PublishError, Publisher, Share, SocialCredentials, GRAPH_API_BASE};

    /// Graph API client: Instagram container + publish, Facebook page photo.
    pub struct GraphPublisher {
        base: Url,
        credentials: SocialCredentials,
    }

    impl GraphPublisher {
        pub fn new(credentials: SocialCredentials) -> anyhow::Result<Self> {
            Self::with_base(GRAPH_API_BASE, credentials)
        }

        pub fn with_base(base: &str, credentials: SocialCredentials) -> anyhow::Result<Self> {
            let base = Url::parse(base)?;
            Ok(Self { base, credentials })
        }

        pub(super) fn endpoint(&self, platform: Platform, path: &str) -> Result<Url, PublishError> {
            self.base.join(path).map_err(|err| PublishError::Failed {
                platform,
                reason: format!("endpoint {}: {}", path, err),
            })
        }

        fn post(
            &self,
            platform: Platform,
            endpoint: &Url,
            params: &[(&str, &str)],
        ) -> Result<serde_json::Value, PublishError> {
            let failed = |reason: String| PublishError::Failed { platform, reason };
            let mut request = ureq::post(endpoint.as_str());
            for (key, value) in params {
                request = request.query(key, value);
            }
            let response = request.call().map_err(|err| failed(err.to_string()))?;
            response
                .into_json::<serde_json::Value>()
                .map_err(|err| failed(format!("decode response: {}", err)))
        }

        fn share_instagram(&self, share: &Share) -> Result<(), PublishError> {
            let platform = Platform::Instagram;
            let (account, token) = self.credentials.for_platform(platform)?;

            let media = self.endpoint(platform, &format!("{}/media", account))?;
            let container = self.post(
                platform,
                &media,
                &[
                    ("image_url", share.image_url.as_str()),
                    ("caption", share.caption.as_str()),
                    ("access_token", token),
                ],
            )?;
            let creation_id = container
                .get("id")
                .and_then(|id| id.as_str())
                .ok_or_else(|| PublishError::Failed {
                    platform,
                    reason: "media container response has no id".to_string(),
                })?;

            let publish = self.endpoint(platform, &format!("{}/media_publish", account))?;
            self.post(
                platform,
                &publish,
                &[("creation_id", creation_id), ("access_token", token)],
            )?;
            Ok(())
        }

        fn share_facebook(&self, share: &Share) -> Result<(), PublishError> {
            let platform = Platform::Facebook;
            let (page, token) = self.credentials.for_platform(platform)?;
            let photos = self.endpoint(platform, &format!("{}/photos", page))?;
            self.post(
                platform,
                &photos,
                &[
                    ("url", share.image_url.as_str()),
                    ("message", share.caption.as_str()),
                    ("access_token", token),
                ],
            )?;
            Ok(())
        }
    }

    impl Publisher for GraphPublisher {
        fn publish(&self, share: &Share) -> Result<(), PublishError> {
            log::info!("sharing {} to {}", share.image_url, share.platform);
            let result = match share.platform {
                Platform::Instagram => self.share_instagram(share),
                Platform::Facebook => self.share_facebook(share),
            };
            if let Err(err) = &result {
                log::warn!("share failed: {}", err);
            }
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(platform: &str, image_url: &str) -> ShareRequest {
        ShareRequest {
            platform: platform.to_string(),
            image_url: image_url.to_string(),
            caption: "hello".to_string(),
        }
    }

    #[test]
    fn missing_fields_are_rejected() {
        let base = "http://localhost:5000";
        assert!(matches!(
            request("", "/static/uploads/a.jpg").validate(base),
            Err(PublishError::InvalidRequest)
        ));
        assert!(matches!(
            request("instagram", "  ").validate(base),
            Err(PublishError::InvalidRequest)
        ));
        let parsed: ShareRequest = serde_json::from_str(r#"{"caption":"x"}"#).unwrap();
        assert!(matches!(
            parsed.validate(base),
            Err(PublishError::InvalidRequest)
        ));
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = request("myspace", "/a.jpg")
            .validate("http://localhost:5000")
            .unwrap_err();
        assert!(matches!(err, PublishError::UnsupportedPlatform(ref p) if p == "myspace"));
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Unsupported platform");
    }

    #[test]
    fn relative_urls_are_made_absolute() {
        let share = request("instagram", "/static/uploads/a.jpg")
            .validate("http://cam.local:5000/")
            .unwrap();
        assert_eq!(share.platform, Platform::Instagram);
        assert_eq!(share.image_url, "http://cam.local:5000/static/uploads/a.jpg");

        assert_eq!(
            absolute_url("http://x", "https://cdn.example.org/a.jpg"),
            "https://cdn.example.org/a.jpg"
        );
    }

    #[test]
    fn credentials_must_be_complete() {
        let creds = SocialCredentials {
            instagram_account_id: "1784".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            creds.for_platform(Platform::Instagram),
            Err(PublishError::NotConfigured(Platform::Instagram))
        ));
        let creds = SocialCredentials {
            facebook_page_id: "42".to_string(),
            facebook_access_token: "tok".to_string(),
            ..Default::default()
        };
        assert_eq!(creds.for_platform(Platform::Facebook).unwrap(), ("42", "tok"));
    }

    #[test]
    fn debug_hides_tokens() {
        let creds = SocialCredentials {
            instagram_access_token: "secret-token".to_string(),
            ..Default::default()
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn disabled_publisher_refuses() {
        let share = request("facebook", "/a.jpg").validate("http://h").unwrap();
        assert!(matches!(
            DisabledPublisher.publish(&share),
            Err(PublishError::Disabled)
        ));
    }

    #[cfg(feature = "publish")]
    #[test]
    fn graph_endpoints_are_versioned() {
        let publisher = GraphPublisher::new(SocialCredentials::default()).unwrap();
        let url = publisher
            .endpoint(Platform::Instagram, "1784/media_publish")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.facebook.com/v13.0/1784/media_publish"
        );
    }
}
