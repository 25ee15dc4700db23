//! Maps raw provider profiles onto the canonical [`Identity`].
//!
//! Providers populate different subsets of their profile payload depending on
//! API version and granted scopes, so every field is read through an ordered
//! list of extraction rules: the first rule that yields a value wins. The rule
//! tables below are the contract; reorder them and sign-ins start picking
//! different avatars or emails.
//!
//! Raw profiles follow the shape produced by the provider clients: a few
//! top-level convenience fields (`id`, `displayName`, `emails`, `photos`) plus
//! the untouched provider payload under `_json`.

use serde_json::Value;
use url::Url;

use authgate_models::{Identity, Provider};

/// One way of reading a field out of a raw profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// JSON pointer to a non-empty string, or a number rendered as a string.
    At(&'static str),
    /// Like `At`, but only when the boolean at `verified` is `true`.
    Verified {
        value: &'static str,
        verified: &'static str,
    },
}

/// Query parameter a provider's image CDN uses to pick the avatar size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeParam {
    pub name: &'static str,
    pub value: &'static str,
}

#[derive(Debug)]
pub struct ProfileRules {
    pub id: &'static [Extract],
    pub name: &'static [Extract],
    pub email: &'static [Extract],
    pub picture: &'static [Extract],
    pub picture_size: Option<SizeParam>,
}

pub const GOOGLE_RULES: ProfileRules = ProfileRules {
    id: &[Extract::At("/id"), Extract::At("/_json/sub"), Extract::At("/_json/id")],
    name: &[Extract::At("/displayName"), Extract::At("/_json/name")],
    email: &[
        Extract::At("/emails/0/value"),
        Extract::Verified {
            value: "/_json/email",
            verified: "/_json/email_verified",
        },
    ],
    picture: &[
        Extract::At("/photos/0/value"),
        Extract::At("/_json/picture"),
        Extract::At("/_json/photos/0/value"),
        Extract::At("/_json/image/url"),
    ],
    picture_size: Some(SizeParam { name: "sz", value: "400" }),
};

pub const GITHUB_RULES: ProfileRules = ProfileRules {
    id: &[Extract::At("/id"), Extract::At("/_json/id")],
    name: &[
        Extract::At("/displayName"),
        Extract::At("/username"),
        Extract::At("/_json/name"),
        Extract::At("/_json/login"),
    ],
    email: &[Extract::At("/emails/0/value"), Extract::At("/_json/email")],
    picture: &[Extract::At("/photos/0/value"), Extract::At("/_json/avatar_url")],
    picture_size: None,
};

pub const LOCAL_RULES: ProfileRules = ProfileRules {
    id: &[Extract::At("/id")],
    name: &[Extract::At("/name")],
    email: &[Extract::At("/email")],
    picture: &[],
    picture_size: None,
};

pub fn rules_for(provider: Provider) -> &'static ProfileRules {
    match provider {
        Provider::Local => &LOCAL_RULES,
        Provider::Google => &GOOGLE_RULES,
        Provider::GitHub => &GITHUB_RULES,
    }
}

/// Normalize a raw profile. Never fails: missing optional fields come back as
/// `None`, missing `id`/`name` as empty strings.
pub fn normalize(provider: Provider, raw: &Value) -> Identity {
    let rules = rules_for(provider);

    let picture = first_match(raw, rules.picture).map(|picture| match rules.picture_size {
        Some(size) => enlarge_picture(&picture, size),
        None => picture,
    });

    Identity {
        id: first_match(raw, rules.id).unwrap_or_default(),
        name: first_match(raw, rules.name).unwrap_or_default(),
        email: first_match(raw, rules.email),
        picture,
        provider,
    }
}

pub fn first_match(raw: &Value, rules: &[Extract]) -> Option<String> {
    rules.iter().find_map(|rule| match *rule {
        Extract::At(pointer) => scalar_at(raw, pointer),
        Extract::Verified { value, verified } => {
            if raw.pointer(verified).and_then(Value::as_bool) == Some(true) {
                scalar_at(raw, value)
            } else {
                None
            }
        }
    })
}

fn scalar_at(raw: &Value, pointer: &str) -> Option<String> {
    match raw.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Rewrite the size parameter of an avatar URL so the full-resolution image is
/// served instead of a thumbnail.
///
/// The first occurrence is replaced in place, later duplicates are dropped and
/// the parameter is appended when missing. Every other query component is kept
/// byte for byte. Strings that do not parse as an absolute URL are returned
/// unchanged.
pub fn enlarge_picture(picture: &str, size: SizeParam) -> String {
    let mut url = match Url::parse(picture) {
        Ok(url) => url,
        Err(_) => return picture.to_string(),
    };

    let sized = format!("{}={}", size.name, size.value);
    let mut replaced = false;
    let mut parts: Vec<String> = Vec::new();

    for part in url.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        let key = part.split('=').next().unwrap_or(part);
        if key == size.name {
            if !replaced {
                parts.push(sized.clone());
                replaced = true;
            }
        } else {
            parts.push(part.to_string());
        }
    }
    if !replaced {
        parts.push(sized);
    }

    url.set_query(Some(&parts.join("&")));
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_google_prefers_structured_photos() {
        let raw = json!({
            "id": "1077",
            "displayName": "Ada Lovelace",
            "emails": [{"value": "ada@example.com"}],
            "photos": [{"value": "https://lh3.example/photo.jpg?sz=50"}],
            "_json": {
                "picture": "https://lh3.example/other.jpg",
                "image": {"url": "https://lh3.example/legacy.jpg"}
            }
        });

        let identity = normalize(Provider::Google, &raw);

        assert_eq!(identity.id, "1077");
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.picture.as_deref(), Some("https://lh3.example/photo.jpg?sz=400"));
        assert_eq!(identity.provider, Provider::Google);
    }

    #[test]
    fn test_google_picture_priority_order() {
        let flattened = json!({"_json": {
            "picture": "https://a.example/flat.png",
            "photos": [{"value": "https://a.example/nested.png"}],
            "image": {"url": "https://a.example/legacy.png"}
        }});
        let nested = json!({"_json": {
            "photos": [{"value": "https://a.example/nested.png"}],
            "image": {"url": "https://a.example/legacy.png"}
        }});

        assert_eq!(
            normalize(Provider::Google, &flattened).picture.as_deref(),
            Some("https://a.example/flat.png?sz=400")
        );
        assert_eq!(
            normalize(Provider::Google, &nested).picture.as_deref(),
            Some("https://a.example/nested.png?sz=400")
        );
    }

    #[test]
    fn test_google_legacy_image_url_only() {
        let raw = json!({
            "id": "42",
            "displayName": "Legacy",
            "_json": {"image": {"url": "https://lh3.example/me.jpg?sz=50"}}
        });

        let identity = normalize(Provider::Google, &raw);

        assert_eq!(identity.picture.as_deref(), Some("https://lh3.example/me.jpg?sz=400"));
    }

    #[test]
    fn test_google_openid_payload() {
        let raw = json!({"_json": {
            "sub": "1099",
            "name": "Grace",
            "email": "grace@example.com",
            "email_verified": true,
            "picture": "https://lh3.example/g"
        }});

        let identity = normalize(Provider::Google, &raw);

        assert_eq!(identity.id, "1099");
        assert_eq!(identity.name, "Grace");
        assert_eq!(identity.email.as_deref(), Some("grace@example.com"));
        assert_eq!(identity.picture.as_deref(), Some("https://lh3.example/g?sz=400"));
    }

    #[test]
    fn test_google_unverified_email_is_dropped() {
        let raw = json!({"_json": {"sub": "1", "email": "maybe@example.com", "email_verified": false}});

        assert_eq!(normalize(Provider::Google, &raw).email, None);
    }

    #[test]
    fn test_missing_picture_is_absent_not_error() {
        let raw = json!({"id": "7", "displayName": "No Photo"});

        let identity = normalize(Provider::Google, &raw);

        assert_eq!(identity.picture, None);
        assert_eq!(identity.email, None);
    }

    #[test]
    fn test_github_fallbacks() {
        let raw = json!({"_json": {
            "id": 583231,
            "login": "octocat",
            "name": null,
            "email": "octo@example.com",
            "avatar_url": "https://avatars.example/u/583231?v=4"
        }});

        let identity = normalize(Provider::GitHub, &raw);

        assert_eq!(identity.id, "583231");
        assert_eq!(identity.name, "octocat");
        assert_eq!(identity.email.as_deref(), Some("octo@example.com"));
        // no size rewrite for GitHub avatars
        assert_eq!(identity.picture.as_deref(), Some("https://avatars.example/u/583231?v=4"));
        assert_eq!(identity.provider, Provider::GitHub);
    }

    #[test]
    fn test_github_top_level_fields_win() {
        let raw = json!({
            "id": "1",
            "displayName": "",
            "username": "monalisa",
            "emails": [{"value": "primary@example.com"}],
            "_json": {"id": 2, "name": "Mona", "email": "public@example.com"}
        });

        let identity = normalize(Provider::GitHub, &raw);

        assert_eq!(identity.id, "1");
        // empty displayName is skipped
        assert_eq!(identity.name, "monalisa");
        assert_eq!(identity.email.as_deref(), Some("primary@example.com"));
    }

    #[test]
    fn test_normalize_total_on_garbage() {
        for raw in [json!(null), json!([]), json!("profile"), json!({"_json": 5})] {
            let identity = normalize(Provider::GitHub, &raw);
            assert_eq!(identity.id, "");
            assert_eq!(identity.name, "");
            assert_eq!(identity.picture, None);
        }
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = json!({"id": "9", "displayName": "Same", "photos": [{"value": "https://x.example/p?sz=10&a=b"}]});

        let first = serde_json::to_vec(&normalize(Provider::Google, &raw)).unwrap();
        let second = serde_json::to_vec(&normalize(Provider::Google, &raw)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_local_rules() {
        let raw = json!({"id": "u_1", "name": "A", "email": "a@x.com"});

        assert_eq!(normalize(Provider::Local, &raw), Identity::local("u_1", "A", "a@x.com"));
    }

    const SZ: SizeParam = SizeParam { name: "sz", value: "400" };

    #[test]
    fn test_enlarge_rewrites_size_only() {
        assert_eq!(enlarge_picture("https://img.example/a?sz=50", SZ), "https://img.example/a?sz=400");
        assert_eq!(
            enlarge_picture("https://img.example/a?x=1&sz=50&y=%20z", SZ),
            "https://img.example/a?x=1&sz=400&y=%20z"
        );
    }

    #[test]
    fn test_enlarge_appends_and_dedupes() {
        assert_eq!(enlarge_picture("https://img.example/a", SZ), "https://img.example/a?sz=400");
        assert_eq!(
            enlarge_picture("https://img.example/a?sz=1&k=v&sz=2", SZ),
            "https://img.example/a?sz=400&k=v"
        );
    }

    #[test]
    fn test_enlarge_passes_unparsable_through() {
        assert_eq!(enlarge_picture("not a url", SZ), "not a url");
        assert_eq!(enlarge_picture("/relative/avatar.png?sz=50", SZ), "/relative/avatar.png?sz=50");
    }
}
