//! Slash-separated addressing into the shared record store.

/// A path into the shared store, e.g. `chats/{conversation}/messages`.
///
/// Paths are sequences of non-empty segments; the textual form joins them
/// with `/`. Segment text must not itself contain a slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()],
        }
    }

    /// Parse a `/`-separated path, skipping empty segments.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_path() {
        let path = StorePath::new("chats").child("abc").child("messages");
        assert_eq!(path.to_string(), "chats/abc/messages");
        assert_eq!(path.last(), Some("messages"));
    }

    #[test]
    fn parse_round_trips() {
        let path = StorePath::parse("calls/1234");
        assert_eq!(path.segments(), &["calls".to_string(), "1234".to_string()]);
        assert_eq!(StorePath::parse(&path.to_string()), path);
    }

    #[test]
    fn parse_skips_empty_segments() {
        assert_eq!(StorePath::parse("/a//b/"), StorePath::new("a").child("b"));
    }

    #[test]
    fn starts_with_covers_self_and_descendants() {
        let root = StorePath::new("chats");
        let deep = root.child("x").child("messages");
        assert!(deep.starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!root.starts_with(&deep));
    }

    #[test]
    fn parent_walks_up() {
        let deep = StorePath::new("a").child("b");
        assert_eq!(deep.parent(), Some(StorePath::new("a")));
        assert_eq!(StorePath::new("a").parent(), Some(StorePath { segments: vec![] }));
    }
}
