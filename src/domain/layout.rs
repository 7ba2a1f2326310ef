//! Object-store key layout and public URL construction.
//!
//! Storage keys use the owner id and filename verbatim while public URLs
//! percent-encode each path segment, so the two are related but not
//! byte-identical for names containing reserved or non-ASCII characters.
//! Decoding a URL segment always yields the raw key segment.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use super::error::DomainError;

/// Fixed object name of a persisted signature document.
pub const DOCUMENT_FILENAME: &str = "email_signature.html";

/// Content type of a persisted signature document.
pub const DOCUMENT_CONTENT_TYPE: &str = "text/html";

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped, so `+`, `&`,
/// `#`, `?` and `/` can never change how a URL is read.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    asset_bucket: String,
    document_bucket: String,
    public_base: Url,
}

impl StorageLayout {
    pub fn new(
        asset_bucket: impl Into<String>,
        document_bucket: impl Into<String>,
        public_base: Url,
    ) -> Result<Self, DomainError> {
        let asset_bucket = asset_bucket.into();
        let document_bucket = document_bucket.into();

        if asset_bucket.trim().is_empty() || document_bucket.trim().is_empty() {
            return Err(DomainError::invariant("bucket names must not be empty"));
        }
        if public_base.cannot_be_a_base() || !matches!(public_base.scheme(), "http" | "https") {
            return Err(DomainError::invariant(format!(
                "public base `{public_base}` must be an http(s) base URL"
            )));
        }

        Ok(Self {
            asset_bucket,
            document_bucket,
            public_base,
        })
    }

    pub fn asset_bucket(&self) -> &str {
        &self.asset_bucket
    }

    pub fn document_bucket(&self) -> &str {
        &self.document_bucket
    }

    pub fn public_base(&self) -> &Url {
        &self.public_base
    }

    /// `{owner_id}/{filename}`, unencoded.
    pub fn asset_key(&self, owner_id: &str, filename: &str) -> String {
        format!("{owner_id}/{filename}")
    }

    /// `{owner_email}/email_signature.html`, unencoded.
    pub fn document_key(&self, owner_email: &str) -> String {
        format!("{owner_email}/{DOCUMENT_FILENAME}")
    }

    /// Bucket-qualified path reported back to callers for an asset key.
    pub fn asset_path(&self, key: &str) -> String {
        format!("{}/{key}", self.asset_bucket)
    }

    /// Bucket-qualified path reported back to callers for a document key.
    pub fn document_path(&self, key: &str) -> String {
        format!("{}/{key}", self.document_bucket)
    }

    /// Public URL of an asset: the base joined with the percent-encoded owner id and filename.
    pub fn public_url(&self, owner_id: &str, filename: &str) -> Result<Url, DomainError> {
        let mut url = self.public_base.clone();
        url.set_query(None);
        url.set_fragment(None);

        let owner_segment = encode_segment(owner_id);
        let filename_segment = encode_segment(filename);
        let suffix = format!("/{owner_segment}/{filename_segment}");
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{suffix}"));

        // Dot segments are collapsed by URL normalisation.
        if !url.path().ends_with(&suffix) {
            return Err(DomainError::invariant(format!(
                "`{owner_id}/{filename}` cannot be addressed under `{}`",
                self.public_base
            )));
        }
        Ok(url)
    }
}

fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, URL_COMPONENT).to_string()
}

/// Public URL base for an S3 bucket using virtual-hosted addressing.
pub fn s3_public_base(bucket: &str, region: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("https://{bucket}.s3.{region}.amazonaws.com"))
}

#[cfg(test)]
mod tests {
    use percent_encoding::percent_decode_str;

    use super::*;

    fn layout(base: &str) -> StorageLayout {
        StorageLayout::new(
            "cdn",
            "onboarding",
            Url::parse(base).expect("valid base url"),
        )
        .expect("valid layout")
    }

    fn decode_segment(segment: &str) -> String {
        percent_decode_str(segment)
            .decode_utf8()
            .expect("utf-8 segment")
            .into_owned()
    }

    fn filename_segment(url: &Url) -> &str {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .expect("filename segment")
    }

    #[test]
    fn keys_use_raw_segments() {
        let layout = layout("https://cdn.example.com");
        assert_eq!(layout.asset_key("u 1", "my logo.png"), "u 1/my logo.png");
        assert_eq!(
            layout.document_key("Adv@X.com"),
            "Adv@X.com/email_signature.html"
        );
        assert_eq!(layout.asset_path("u1/a.png"), "cdn/u1/a.png");
        assert_eq!(
            layout.document_path("adv@x.com/email_signature.html"),
            "onboarding/adv@x.com/email_signature.html"
        );
    }

    #[test]
    fn public_url_percent_encodes_segments() {
        let layout = layout("https://cdn.example.com");
        let url = layout
            .public_url("u1", "my logo é.png")
            .expect("url builds");
        assert_eq!(
            url.as_str(),
            "https://cdn.example.com/u1/my%20logo%20%C3%A9.png"
        );

        assert_eq!(decode_segment(filename_segment(&url)), "my logo é.png");
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let layout = layout("https://cdn.example.com");
        let url = layout
            .public_url("u1", "logo+dark&amp;v=2#x?y.png")
            .expect("url builds");
        assert_eq!(
            url.as_str(),
            "https://cdn.example.com/u1/logo%2Bdark%26amp%3Bv%3D2%23x%3Fy.png"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert_eq!(
            decode_segment(filename_segment(&url)),
            "logo+dark&amp;v=2#x?y.png"
        );
    }

    #[test]
    fn decoded_segments_match_raw_keys() {
        let layout = layout("https://cdn.example.com/assets");
        for (owner, filename) in [
            ("u1", "a+b.png"),
            ("user@example.com", "q=1;r:2,$[x].png"),
            ("u 1", "100% real.png"),
            ("u1", "it's (ok)!~*.png"),
        ] {
            let url = layout.public_url(owner, filename).expect("url builds");
            let decoded: Vec<String> = url
                .path_segments()
                .expect("segments")
                .skip(1)
                .map(decode_segment)
                .collect();
            assert_eq!(
                decoded.join("/"),
                layout.asset_key(owner, filename),
                "{owner}/{filename}"
            );
        }
    }

    #[test]
    fn slashes_inside_segments_are_encoded() {
        let layout = layout("https://cdn.example.com");
        let url = layout.public_url("a/b", "c.png").expect("url builds");
        assert_eq!(url.as_str(), "https://cdn.example.com/a%2Fb/c.png");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let layout = layout("https://cdn.example.com/assets/");
        let url = layout.public_url("u1", "a.png").expect("url builds");
        assert_eq!(url.as_str(), "https://cdn.example.com/assets/u1/a.png");
    }

    #[test]
    fn s3_base_uses_virtual_host() {
        let base = s3_public_base("finny-cdn", "us-east-2").expect("valid");
        assert_eq!(base.as_str(), "https://finny-cdn.s3.us-east-2.amazonaws.com/");
    }

    #[test]
    fn dot_segments_cannot_be_addressed() {
        let layout = layout("https://cdn.example.com/assets/");
        assert!(layout.public_url("u1", "..").is_err());
        assert!(layout.public_url("..", "a.png").is_err());
        assert!(layout.public_url(".", "a.png").is_err());
    }

    #[test]
    fn rejects_non_http_base() {
        let base = Url::parse("mailto:someone@example.com").expect("parses");
        assert!(StorageLayout::new("cdn", "docs", base).is_err());
        let base = Url::parse("https://cdn.example.com").expect("parses");
        assert!(StorageLayout::new(" ", "docs", base).is_err());
    }
}
