use anyhow::{bail, Context, Result};

/// Pieces of a magic-link URL the consume path needs. The link code rides
/// in the URL fragment so it never reaches server access logs; only its
/// hash is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLink {
    pub tenant_id: String,
    pub pre_auth_session_id: String,
    pub link_code: String,
}

#[derive(Debug, Clone)]
pub struct MagicLinkBuilder {
    base_url: String,
}

impl MagicLinkBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Tenant ids, pre-auth session ids, and link codes are all generated
    /// from URL-safe alphabets, so no percent-encoding is needed.
    pub fn build(&self, tenant: &str, pre_auth_session_id: &str, link_code: &str) -> String {
        format!(
            "{}/verify?preAuthSessionId={pre_auth_session_id}&tenantId={tenant}#{link_code}",
            self.base_url
        )
    }

    pub fn parse(url: &str) -> Result<MagicLink> {
        let (rest, link_code) = url
            .split_once('#')
            .context("magic link is missing its code fragment")?;
        if link_code.is_empty() {
            bail!("magic link is missing its code fragment");
        }

        let (_, query) = rest
            .split_once('?')
            .context("magic link is missing its query string")?;

        let mut pre_auth_session_id = None;
        let mut tenant_id = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("preAuthSessionId", v)) => pre_auth_session_id = Some(v.to_string()),
                Some(("tenantId", v)) => tenant_id = Some(v.to_string()),
                _ => {}
            }
        }

        Ok(MagicLink {
            tenant_id: tenant_id.context("magic link is missing tenantId")?,
            pre_auth_session_id: pre_auth_session_id
                .context("magic link is missing preAuthSessionId")?,
            link_code: link_code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_round_trips() {
        let builder = MagicLinkBuilder::new("https://app.example.com/auth/");
        let url = builder.build("public", "pre-123", "secret-code");
        assert_eq!(
            url,
            "https://app.example.com/auth/verify?preAuthSessionId=pre-123&tenantId=public#secret-code"
        );

        let parsed = MagicLinkBuilder::parse(&url).unwrap();
        assert_eq!(
            parsed,
            MagicLink {
                tenant_id: "public".into(),
                pre_auth_session_id: "pre-123".into(),
                link_code: "secret-code".into(),
            }
        );
    }

    #[test]
    fn parse_rejects_links_without_code_or_session() {
        assert!(MagicLinkBuilder::parse("https://x/verify?tenantId=public").is_err());
        assert!(MagicLinkBuilder::parse("https://x/verify?tenantId=public#").is_err());
        assert!(MagicLinkBuilder::parse("https://x/verify?preAuthSessionId=p#code").is_err());
    }
}
