// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;

/// Counters for one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReport {
    pub chat_created: bool,
    pub chat_updated: bool,
    pub messages_loaded: usize,
    pub messages_created: usize,
    pub messages_updated: usize,
    /// Messages the router rejected; the chat itself still counts as done.
    pub message_errors: Vec<String>,
}

/// Outcome of a history sync run. Per-chat failures land in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub chats_processed: usize,
    pub chats_created: usize,
    pub chats_updated: usize,
    /// Chats dropped by the `since` filter before any task ran.
    pub chats_skipped: usize,
    pub messages_loaded: usize,
    pub messages_created: usize,
    pub messages_updated: usize,
    pub messages_failed: usize,
    pub errors: Vec<String>,
}

impl SyncSummary {
    pub(crate) fn record(&mut self, report: ChatReport) {
        self.chats_processed += 1;
        self.chats_created += usize::from(report.chat_created);
        self.chats_updated += usize::from(report.chat_updated);
        self.messages_loaded += report.messages_loaded;
        self.messages_created += report.messages_created;
        self.messages_updated += report.messages_updated;
        self.messages_failed += report.message_errors.len();
        self.errors.extend(report.message_errors);
    }

    pub(crate) fn fail(&mut self, external_chat_id: &str, error: impl std::fmt::Display) {
        self.chats_processed += 1;
        self.errors.push(format!("chat {external_chat_id}: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_accumulate() {
        let mut summary = SyncSummary::default();
        summary.record(ChatReport {
            chat_created: true,
            messages_loaded: 3,
            messages_created: 2,
            messages_updated: 1,
            ..ChatReport::default()
        });
        summary.record(ChatReport {
            messages_loaded: 1,
            messages_created: 1,
            message_errors: vec!["chat c3: message m9: event has no chat id".into()],
            ..ChatReport::default()
        });
        summary.fail("c2", "platform error 500: boom");
        assert_eq!(summary.chats_processed, 3);
        assert_eq!(summary.messages_failed, 1);
        assert_eq!(summary.chats_created, 1);
        assert_eq!(summary.messages_created, 3);
        assert_eq!(
            summary.errors,
            [
                "chat c3: message m9: event has no chat id",
                "chat c2: platform error 500: boom",
            ]
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["messages_loaded"], 4);
        assert_eq!(json["messages_failed"], 1);
    }
}
