use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(PostId);
id_newtype!(UserId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

/// A published post as the server reports it. The client holds these
/// read-only; `likes` and `caption` change only through server round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author: UserSummary,
    pub image_url: String,
    pub caption: String,
    pub likes: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn liked_by(&self, user_id: &UserId) -> bool {
        self.likes.contains(user_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }
}

/// Orders a fetched feed newest-first. Ties on `created_at` break on
/// descending id so two posts with the same timestamp keep a stable order
/// across refetches.
pub fn sort_feed(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, created_at: &str) -> Post {
        Post {
            id: PostId::new(id),
            author: UserSummary {
                id: UserId::new("u1"),
                username: "alice".to_string(),
            },
            image_url: format!("https://cdn.example/{id}.jpg"),
            caption: "caption".to_string(),
            likes: Vec::new(),
            created_at: created_at.parse().expect("timestamp"),
        }
    }

    #[test]
    fn sorts_feed_newest_first() {
        let mut posts = vec![
            post("a", "2024-01-01T00:00:00Z"),
            post("b", "2024-01-03T00:00:00Z"),
            post("c", "2024-01-02T00:00:00Z"),
        ];

        sort_feed(&mut posts);

        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn breaks_created_at_ties_on_descending_id() {
        let mut posts = vec![
            post("a", "2024-01-01T00:00:00Z"),
            post("b", "2024-01-01T00:00:00Z"),
        ];

        sort_feed(&mut posts);

        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn liked_by_checks_membership() {
        let mut p = post("a", "2024-01-01T00:00:00Z");
        p.likes.push(UserId::new("u7"));

        assert!(p.liked_by(&UserId::new("u7")));
        assert!(!p.liked_by(&UserId::new("u8")));
        assert_eq!(p.like_count(), 1);
    }

    #[test]
    fn post_uses_camel_case_wire_names() {
        let raw = r#"{
            "id": "p1",
            "author": { "id": "u1", "username": "alice" },
            "imageUrl": "https://cdn.example/p1.jpg",
            "caption": "Sunset",
            "likes": ["u2"],
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;

        let parsed: Post = serde_json::from_str(raw).expect("post");
        assert_eq!(parsed.image_url, "https://cdn.example/p1.jpg");
        assert_eq!(parsed.likes, vec![UserId::new("u2")]);
    }
}
