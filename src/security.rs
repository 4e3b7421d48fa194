use regex::Regex;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use crate::errors::{AppError, AppResult};

/// Longest post X accepts, counted in characters
pub const MAX_POST_CHARS: usize = 280;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // RFC 6750 b64token
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-._~+/]+=*$").expect("valid token regex"))
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"))
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_access_token(token: &str) -> AppResult<()> {
        let trimmed = token.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation(
                "accessToken",
                "Missing required credentials",
            ));
        }

        if trimmed.len() > 4096 {
            return Err(AppError::validation("accessToken", "Access token too long"));
        }

        if !token_pattern().is_match(trimmed) {
            return Err(AppError::validation(
                "accessToken",
                "Access token contains invalid characters",
            ));
        }

        Ok(())
    }

    /// Post text rules: at most `MAX_POST_CHARS` characters, and blank text
    /// only when media is attached.
    pub fn validate_post_text(text: &str, has_media: bool) -> AppResult<()> {
        let length = text.chars().count();
        if length > MAX_POST_CHARS {
            return Err(AppError::TextTooLong {
                length,
                max: MAX_POST_CHARS,
            });
        }

        if text.trim().is_empty() && !has_media {
            return Err(AppError::EmptyPost);
        }

        Ok(())
    }

    pub fn validate_media_url(url: &str) -> AppResult<Url> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| AppError::validation("mediaUrl", &format!("Invalid URL: {}", e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::validation(
                "mediaUrl",
                "Only http and https URLs are supported",
            ));
        }

        if parsed.host_str().is_none() {
            return Err(AppError::validation("mediaUrl", "URL has no host"));
        }

        Ok(parsed)
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        // Limit length
        if sanitized.chars().count() > 255 {
            let truncated: String = sanitized.chars().take(252).collect();
            format!("{}...", truncated)
        } else {
            sanitized.to_string()
        }
    }
}

// File system security utilities
pub struct FileSystemGuard;

impl FileSystemGuard {
    /// Create a randomly named staging file inside `temp_dir`. The file is
    /// removed when the returned handle is dropped.
    pub fn create_staging_file(temp_dir: &Path) -> AppResult<NamedTempFile> {
        std::fs::create_dir_all(temp_dir)?;

        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".part")
            .tempfile_in(temp_dir)?;

        log::debug!("Created staging file {}", file.path().display());
        Ok(file)
    }
}

// Network guard for server-side media fetches
pub struct MediaHostGuard;

impl MediaHostGuard {
    /// Resolve the host of a media URL and refuse anything that is not a public
    /// address. Returns the domain and the address to pin the connection to, or
    /// `None` when the host is already an IP literal.
    pub async fn resolve_public(url: &Url) -> AppResult<Option<(String, SocketAddr)>> {
        let host = url
            .host_str()
            .ok_or_else(|| AppError::validation("mediaUrl", "URL has no host"))?;

        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            Self::ensure_public(ip)?;
            return Ok(None);
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| {
                AppError::validation("mediaUrl", &format!("Could not resolve {}: {}", host, e))
            })?
            .collect();

        // Every record must be public, or a later connect could pick a bad one
        for addr in &addrs {
            Self::ensure_public(addr.ip())?;
        }

        let pinned = addrs.first().copied().ok_or_else(|| {
            AppError::validation("mediaUrl", &format!("{} has no addresses", host))
        })?;
        Ok(Some((host.to_string(), pinned)))
    }

    fn ensure_public(ip: IpAddr) -> AppResult<()> {
        if is_public_address(ip) {
            Ok(())
        } else {
            log::warn!("Refusing media fetch from non-public address {}", ip);
            Err(AppError::validation(
                "mediaUrl",
                &format!("Host resolves to a non-public address ({})", ip),
            ))
        }
    }
}

pub fn is_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    let shared_address_space = first == 100 && (64..128).contains(&second);

    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || first == 0
        || shared_address_space)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;

    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_validation() {
        assert!(InputValidator::validate_access_token("AAAAbc-123._~+/==").is_ok());
        assert!(InputValidator::validate_access_token("   ").is_err());
        assert!(InputValidator::validate_access_token("token with spaces").is_err());
        assert!(InputValidator::validate_access_token(&"a".repeat(5000)).is_err());
    }

    #[test]
    fn test_post_text_length_counts_characters() {
        assert!(InputValidator::validate_post_text(&"é".repeat(280), false).is_ok());

        match InputValidator::validate_post_text(&"x".repeat(281), true) {
            Err(AppError::TextTooLong { length, max }) => {
                assert_eq!(length, 281);
                assert_eq!(max, MAX_POST_CHARS);
            }
            other => panic!("expected TextTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_text_needs_media() {
        assert!(matches!(
            InputValidator::validate_post_text("", false),
            Err(AppError::EmptyPost)
        ));
        assert!(matches!(
            InputValidator::validate_post_text(" \n\t", false),
            Err(AppError::EmptyPost)
        ));
        assert!(InputValidator::validate_post_text("", true).is_ok());
    }

    #[test]
    fn test_media_url_validation() {
        assert!(InputValidator::validate_media_url("https://example.com/clip.mp4").is_ok());
        assert!(InputValidator::validate_media_url("file:///etc/passwd").is_err());
        assert!(InputValidator::validate_media_url("not a url").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        let safe = InputValidator::sanitize_filename("../clip<script>.mp4");
        assert!(!safe.contains('<'));
        assert!(!safe.contains('/'));

        let long = InputValidator::sanitize_filename(&"a".repeat(300));
        assert_eq!(long.chars().count(), 255);
    }

    #[test]
    fn test_staging_file_removed_on_drop() {
        let dir = std::env::temp_dir().join("tweet_uploader_test_staging");
        let file = FileSystemGuard::create_staging_file(&dir).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_non_public_addresses_rejected() {
        for blocked in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.9",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "::",
            "::ffff:127.0.0.1",
            "fd00::1",
            "fe80::1",
        ] {
            let ip: IpAddr = blocked.parse().unwrap();
            assert!(!is_public_address(ip), "{} should be blocked", blocked);
        }

        for allowed in ["8.8.8.8", "93.184.216.34", "2606:4700:4700::1111"] {
            let ip: IpAddr = allowed.parse().unwrap();
            assert!(is_public_address(ip), "{} should be allowed", allowed);
        }
    }

    #[tokio::test]
    async fn test_media_host_guard() {
        for url in [
            "http://127.0.0.1:8080/photo.png",
            "http://[::1]/photo.png",
            "http://169.254.169.254/latest/meta-data/",
            "http://localhost/photo.png",
        ] {
            let url = Url::parse(url).unwrap();
            assert!(
                MediaHostGuard::resolve_public(&url).await.unwrap_err().is_validation(),
                "{} should be refused",
                url
            );
        }

        let public = Url::parse("https://93.184.216.34/photo.png").unwrap();
        assert_eq!(MediaHostGuard::resolve_public(&public).await.unwrap(), None);
    }
}
