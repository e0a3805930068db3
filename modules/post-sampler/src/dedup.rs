use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Dedup key of a post. Keyed by the field it came from, so a `uri` and an
/// `id` with the same text stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostIdentity {
    Uri(String),
    Id(String),
}

impl PostIdentity {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

/// Dedup identity of an opaque post: its `uri`, or `id` when there is no uri.
/// Empty strings count as missing; numeric ids are stringified.
pub fn post_identity(post: &Value) -> Option<PostIdentity> {
    let field = |key: &str| match post.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    field("uri")
        .map(PostIdentity::Uri)
        .or_else(|| field("id").map(PostIdentity::Id))
}

/// Creation time of a post: `createdAt` at the top level or inside `record`.
pub fn post_created_at(post: &Value) -> Option<DateTime<Utc>> {
    let raw = post
        .get("createdAt")
        .or_else(|| post.get("record").and_then(|r| r.get("createdAt")))
        .or_else(|| post.get("created_at"))?
        .as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Post identities already written during this run. Grows monotonically.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashSet<PostIdentity>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the post and return true if it has a usable identity that
    /// hasn't been seen before. Returns false otherwise and records nothing.
    pub fn accept(&mut self, post: &Value) -> bool {
        match post_identity(post) {
            Some(id) => self.seen.insert(id),
            None => false,
        }
    }

    pub fn contains(&self, identity: &PostIdentity) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identities_are_accepted_once() {
        let mut store = DedupStore::new();
        let post = json!({ "uri": "at://did:plc:abc/app.bsky.feed.post/1" });

        assert!(store.accept(&post));
        assert!(!store.accept(&post));
        let same_uri = json!({ "uri": "at://did:plc:abc/app.bsky.feed.post/1", "extra": 1 });
        assert!(!store.accept(&same_uri));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_or_empty_identity_is_rejected() {
        let mut store = DedupStore::new();
        assert!(!store.accept(&json!({ "text": "no identity" })));
        assert!(!store.accept(&json!({ "uri": "" })));
        assert!(!store.accept(&json!({ "uri": null })));
        assert!(!store.accept(&Value::Null));
        assert!(store.is_empty());
    }

    #[test]
    fn id_used_when_uri_absent() {
        let mut store = DedupStore::new();
        assert!(store.accept(&json!({ "id": 113_000_000_001u64 })));
        assert!(store.contains(&PostIdentity::id("113000000001")));
        assert!(store.accept(&json!({ "uri": "", "id": "abc" })));
        assert!(!store.accept(&json!({ "id": "abc" })));
    }

    #[test]
    fn uri_and_id_with_same_text_are_distinct() {
        let mut store = DedupStore::new();
        assert!(store.accept(&json!({ "uri": "123" })));
        assert!(store.accept(&json!({ "id": 123 })));
        assert!(!store.accept(&json!({ "id": "123" })));
        assert!(store.contains(&PostIdentity::uri("123")));
        assert!(store.contains(&PostIdentity::id("123")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn long_mixed_sequence_never_accepts_twice() {
        let mut store = DedupStore::new();
        let mut accepted = Vec::new();
        for i in 0..500 {
            let post = json!({ "uri": format!("at://post/{}", i % 37) });
            if store.accept(&post) {
                accepted.push(post_identity(&post).unwrap());
            }
        }
        let unique: HashSet<_> = accepted.iter().collect();
        assert_eq!(accepted.len(), 37);
        assert_eq!(unique.len(), accepted.len());
    }

    #[test]
    fn created_at_read_from_record() {
        let post = json!({ "record": { "createdAt": "2024-01-05T10:11:12.345Z" } });
        let ts = post_created_at(&post).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-05T10:11:12.345+00:00");

        assert!(post_created_at(&json!({ "createdAt": "yesterday" })).is_none());
        assert!(post_created_at(&json!({})).is_none());
    }
}
