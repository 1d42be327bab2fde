/// Store subtree holding conversation message logs
pub const CHATS_ROOT: &str = "chats";

/// Store subtree holding group conversation message logs
pub const GROUPS_ROOT: &str = "group_chats";

/// Legacy store subtree for advisor conversations, keyed by the student's
/// user id. Historical messages may still live here.
pub const ADVISOR_CHATS_ROOT: &str = "advisor_chats";

/// Store subtree holding call signaling records, keyed by call id
pub const CALLS_ROOT: &str = "calls";

/// Segment under a conversation node that holds the message map
pub const MESSAGES_SEGMENT: &str = "messages";

/// Maximum chat message length in characters
pub const MAX_MESSAGE_CHARS: usize = 8_192;

/// Length of a store push key in characters
pub const PUSH_KEY_LEN: usize = 20;
