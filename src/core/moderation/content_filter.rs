// Content filter: prohibited words, invite links and unlisted link domains.
//
// Any single match triggers; there is no tolerance threshold. Checks run in
// a fixed order (words, invites, links) and the first hit wins.

use super::moderation_errors::DetectorError;
use super::moderation_models::{
    ContentFilterConfig, DetectionResult, DetectionSubject, Evidence, EvidenceItem,
    MessageCreated, ModerationAction, RuleType, Severity,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use url::Url;

/// A scheme or `www.` prefix, or a bare `host.tld/` followed by a path.
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:https?://|www\.)[^\s<>"']+|\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}/[^\s<>"']*"#,
    )
    .expect("link pattern compiles")
});

static INVITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://)?(?:www\.)?(?:discord(?:app)?\.com/invite|discord\.gg|dsc\.gg)/([a-z0-9-]+)",
    )
    .expect("invite pattern compiles")
});

/// Word list compiled into one case-insensitive alternation.
struct CompiledWords {
    source: Vec<String>,
    pattern: Option<Regex>,
}

impl CompiledWords {
    fn build(words: &[String]) -> Result<Self, DetectorError> {
        let mut terms: Vec<String> = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        // Longest first so "bad word" wins over "bad".
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();

        let pattern = if terms.is_empty() {
            None
        } else {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            // Letters, digits and underscore are word characters; anything
            // else (or the string edge) is a boundary. Works for terms that
            // start or end with punctuation, unlike \b.
            let source = format!(
                r"(?i)(?:^|[^\p{{L}}\p{{N}}_])({})(?:$|[^\p{{L}}\p{{N}}_])",
                alternation
            );
            Some(Regex::new(&source).map_err(|e| DetectorError::Pattern(e.to_string()))?)
        };

        Ok(Self {
            source: words.to_vec(),
            pattern,
        })
    }

    fn find(&self, content: &str) -> Option<String> {
        let captures = self.pattern.as_ref()?.captures(content)?;
        captures.get(1).map(|m| m.as_str().to_lowercase())
    }
}

pub struct ContentFilterDetector {
    /// Compiled word lists per guild, rebuilt when the list changes.
    compiled: DashMap<u64, Arc<CompiledWords>>,
}

impl ContentFilterDetector {
    pub fn new() -> Self {
        Self {
            compiled: DashMap::new(),
        }
    }

    pub fn evaluate(
        &self,
        config: &ContentFilterConfig,
        msg: &MessageCreated,
    ) -> Result<Option<DetectionResult>, DetectorError> {
        if !config.enabled {
            return Ok(None);
        }

        let Some((item, severity, description)) = self.first_match(config, msg)? else {
            return Ok(None);
        };

        tracing::debug!(
            guild_id = msg.guild_id,
            user_id = msg.author_id,
            "Content filter matched"
        );

        Ok(Some(DetectionResult {
            rule_type: RuleType::ContentFilter,
            severity,
            subject: DetectionSubject::User(msg.author_id),
            user_id: msg.author_id,
            channel_id: Some(msg.channel_id),
            message_id: Some(msg.message_id),
            description,
            evidence: Evidence::new(vec![item]).with_excerpt(&msg.content),
            should_auto_action: !config.auto_action.is_none(),
            recommended_action: ModerationAction::User(config.auto_action),
        }))
    }

    fn first_match(
        &self,
        config: &ContentFilterConfig,
        msg: &MessageCreated,
    ) -> Result<Option<(EvidenceItem, Severity, String)>, DetectorError> {
        let words = self.words_for(msg.guild_id, &config.prohibited_words)?;
        if let Some(word) = words.find(&msg.content) {
            let description = format!("Prohibited word: {}", word);
            return Ok(Some((
                EvidenceItem::ProhibitedWord { word },
                Severity::Medium,
                description,
            )));
        }

        if config.block_invite_links {
            if let Some(code) = find_invite(&msg.content) {
                let description = format!("Invite link: {}", code);
                return Ok(Some((
                    EvidenceItem::InviteLink { code },
                    Severity::Medium,
                    description,
                )));
            }
        }

        if config.block_unlisted_links {
            if let Some(domain) = find_unlisted_domain(&msg.content, &config.allowed_link_domains) {
                let description = format!("Link to unlisted domain: {}", domain);
                return Ok(Some((
                    EvidenceItem::UnlistedLink { domain },
                    Severity::Low,
                    description,
                )));
            }
        }

        Ok(None)
    }

    fn words_for(&self, guild_id: u64, words: &[String]) -> Result<Arc<CompiledWords>, DetectorError> {
        if let Some(existing) = self.compiled.get(&guild_id) {
            if existing.source == words {
                return Ok(Arc::clone(&existing));
            }
        }

        let compiled = Arc::new(CompiledWords::build(words)?);
        self.compiled.insert(guild_id, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn forget_guild(&self, guild_id: u64) {
        self.compiled.remove(&guild_id);
    }
}

impl Default for ContentFilterDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// First Discord invite code in the text, lowercased.
pub fn find_invite(content: &str) -> Option<String> {
    INVITE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Hosts of every link in the text, lowercased, in order of appearance.
pub fn extract_link_hosts(content: &str) -> Vec<String> {
    LINK_RE
        .find_iter(content)
        .filter_map(|m| {
            let raw = m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':']);
            let lower = raw.to_lowercase();
            let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
                raw.to_string()
            } else {
                format!("http://{}", raw)
            };
            Url::parse(&candidate).ok().and_then(|url| {
                url.host_str()
                    .map(|h| h.to_lowercase().trim_start_matches("www.").to_string())
            })
        })
        .collect()
}

/// `host` is allowed if it equals an allowed domain or is a subdomain of one.
pub fn is_domain_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.trim_start_matches("www.");
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_lowercase();
        let domain = domain.trim_start_matches("www.");
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

fn find_unlisted_domain(content: &str, allowed: &[String]) -> Option<String> {
    extract_link_hosts(content)
        .into_iter()
        .find(|host| !is_domain_allowed(host, allowed))
}
