//! Conversation identity and source-path resolution.
//!
//! Direct conversations get a deterministic, participant-order-independent
//! id. Conversations with the platform's singleton advisor account have a
//! second, legacy source path (`advisor_chats/{student}/messages`) left over
//! from an earlier storage layout; message readers must merge both.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::{ADVISOR_CHATS_ROOT, CHATS_ROOT, GROUPS_ROOT, MESSAGES_SEGMENT};
use crate::path::StorePath;
use crate::types::{ConversationId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// An addressable chat thread, direct (two-party) or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub participants: BTreeSet<UserId>,
}

impl Conversation {
    pub fn direct(a: UserId, b: UserId) -> Self {
        let id = ConversationId::direct(&a, &b);
        Self {
            id,
            kind: ConversationKind::Direct,
            participants: BTreeSet::from([a, b]),
        }
    }

    pub fn group(id: ConversationId, participants: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            id,
            kind: ConversationKind::Group,
            participants: participants.into_iter().collect(),
        }
    }

    /// Canonical message-log path for this conversation.
    ///
    /// This is where all new writes go, regardless of any legacy alias.
    pub fn messages_path(&self) -> StorePath {
        let root = match self.kind {
            ConversationKind::Direct => CHATS_ROOT,
            ConversationKind::Group => GROUPS_ROOT,
        };
        StorePath::new(root)
            .child(self.id.as_str())
            .child(MESSAGES_SEGMENT)
    }
}

/// Resolves which store paths carry a conversation's messages.
///
/// Constructed with the advisor account id (if the deployment has one)
/// rather than reading it from ambient state.
#[derive(Debug, Clone, Default)]
pub struct ConversationRegistry {
    advisor: Option<UserId>,
}

impl ConversationRegistry {
    pub fn new(advisor: Option<UserId>) -> Self {
        Self { advisor }
    }

    /// All source paths that may hold messages for `conversation`.
    ///
    /// The canonical path always comes first. For a direct conversation with
    /// the advisor party, the legacy per-student alias is appended. Group
    /// conversations have a single path.
    pub fn source_paths(&self, conversation: &Conversation) -> Vec<StorePath> {
        let mut paths = vec![conversation.messages_path()];

        if conversation.kind == ConversationKind::Direct {
            if let Some(student) = self.legacy_counterpart(conversation) {
                paths.push(
                    StorePath::new(ADVISOR_CHATS_ROOT)
                        .child(student.as_str())
                        .child(MESSAGES_SEGMENT),
                );
            }
        }

        paths
    }

    /// For a direct conversation involving the advisor, the other participant.
    fn legacy_counterpart<'a>(&self, conversation: &'a Conversation) -> Option<&'a UserId> {
        let advisor = self.advisor.as_ref()?;
        if !conversation.participants.contains(advisor) {
            return None;
        }
        conversation.participants.iter().find(|p| *p != advisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn direct_conversation_id_independent_of_order() {
        let left = Conversation::direct(user("maya"), user("leo"));
        let right = Conversation::direct(user("leo"), user("maya"));
        assert_eq!(left.id, right.id);
        assert_eq!(left.participants, right.participants);
    }

    #[test]
    fn group_conversation_resolves_single_path() {
        let registry = ConversationRegistry::new(Some(user("advisor")));
        let conv = Conversation::group(
            ConversationId::group("physics-101"),
            [user("maya"), user("leo"), user("advisor")],
        );

        let paths = registry.source_paths(&conv);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].to_string(), "group_chats/physics-101/messages");
    }

    #[test]
    fn plain_direct_conversation_has_no_alias() {
        let registry = ConversationRegistry::new(Some(user("advisor")));
        let conv = Conversation::direct(user("maya"), user("leo"));

        let paths = registry.source_paths(&conv);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0], conv.messages_path());
    }

    #[test]
    fn advisor_conversation_includes_legacy_alias() {
        let registry = ConversationRegistry::new(Some(user("advisor")));
        let conv = Conversation::direct(user("maya"), user("advisor"));

        let paths = registry.source_paths(&conv);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], conv.messages_path());
        assert_eq!(paths[1].to_string(), "advisor_chats/maya/messages");
    }

    #[test]
    fn no_advisor_configured_means_no_alias() {
        let registry = ConversationRegistry::new(None);
        let conv = Conversation::direct(user("maya"), user("advisor"));
        assert_eq!(registry.source_paths(&conv).len(), 1);
    }
}
