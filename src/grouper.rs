//! Sender grouping and representative action selection

use std::collections::HashMap;
use tracing::debug;

use crate::config::ProcessingMode;
use crate::models::{Message, SenderGroup, UnsubscribeCandidate};

/// Normalized sender identity for a message
///
/// Lower-cased address parsed at fetch time; messages whose From header
/// never yielded an address fall back to the raw header string, and as a
/// last resort the message id, so every message still groups.
pub fn sender_key(message: &Message) -> String {
    if !message.sender_email.is_empty() {
        return message.sender_email.to_lowercase();
    }

    if let Some(raw_from) = message.headers.get("From") {
        let trimmed = raw_from.trim();
        if !trimmed.is_empty() {
            return trimmed.to_lowercase();
        }
    }

    message.id.clone()
}

/// Aggregates candidates across messages, one representative per sender
pub struct SenderGrouper;

struct GroupBuilder {
    sender_name: String,
    message_ids: Vec<String>,
    representative: Option<UnsubscribeCandidate>,
}

impl SenderGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Group messages and their candidates into sender groups
    ///
    /// Output order follows the first appearance of each sender key in the
    /// input, so grouping the same input twice yields identical output.
    /// Senders with no usable candidate produce no group.
    pub fn group(
        &self,
        messages: &[Message],
        candidates: &[UnsubscribeCandidate],
        mode: ProcessingMode,
    ) -> Vec<SenderGroup> {
        match mode {
            ProcessingMode::Grouped => self.group_by_sender(messages, candidates),
            ProcessingMode::Individual => self.group_individually(messages, candidates),
        }
    }

    /// One group per normalized sender across all messages
    fn group_by_sender(
        &self,
        messages: &[Message],
        candidates: &[UnsubscribeCandidate],
    ) -> Vec<SenderGroup> {
        let mut key_order: Vec<String> = Vec::new();
        let mut builders: HashMap<String, GroupBuilder> = HashMap::new();
        let mut key_by_message: HashMap<String, String> = HashMap::new();

        for message in messages {
            let key = sender_key(message);
            key_by_message.insert(message.id.clone(), key.clone());

            let builder = builders.entry(key.clone()).or_insert_with(|| {
                key_order.push(key.clone());
                GroupBuilder {
                    sender_name: message.sender_name.clone(),
                    message_ids: Vec::new(),
                    representative: None,
                }
            });
            builder.message_ids.push(message.id.clone());
        }

        // Candidates arrive in message order, so the first candidate at a
        // given rank is also the earliest-seen one; strict greater-than
        // keeps it on ties.
        for candidate in candidates {
            let Some(key) = key_by_message.get(&candidate.message_id) else {
                continue;
            };
            let Some(builder) = builders.get_mut(key) else {
                continue;
            };

            let replace = match &builder.representative {
                None => true,
                Some(current) => candidate.rank() > current.rank(),
            };
            if replace {
                builder.representative = Some(candidate.clone());
            }
        }

        let mut groups = Vec::new();
        for key in key_order {
            let Some(builder) = builders.remove(&key) else {
                continue;
            };
            let Some(representative) = builder.representative else {
                debug!(sender = %key, "no usable candidate for sender, skipping");
                continue;
            };

            groups.push(SenderGroup {
                sender_key: key,
                sender_name: builder.sender_name,
                representative,
                message_ids: builder.message_ids,
            });
        }

        groups
    }

    /// One group of size one per message that has a candidate
    ///
    /// Trades the efficiency of cross-message deduplication for
    /// per-message precision.
    fn group_individually(
        &self,
        messages: &[Message],
        candidates: &[UnsubscribeCandidate],
    ) -> Vec<SenderGroup> {
        let mut by_message: HashMap<&str, Vec<&UnsubscribeCandidate>> = HashMap::new();
        for candidate in candidates {
            by_message
                .entry(candidate.message_id.as_str())
                .or_default()
                .push(candidate);
        }

        let mut groups = Vec::new();
        for message in messages {
            let Some(message_candidates) = by_message.get(message.id.as_str()) else {
                continue;
            };

            let mut representative: Option<&UnsubscribeCandidate> = None;
            for candidate in message_candidates.iter().copied() {
                let replace = match representative {
                    None => true,
                    Some(current) => candidate.rank() > current.rank(),
                };
                if replace {
                    representative = Some(candidate);
                }
            }

            if let Some(representative) = representative {
                groups.push(SenderGroup {
                    sender_key: sender_key(message),
                    sender_name: message.sender_name.clone(),
                    representative: representative.clone(),
                    message_ids: vec![message.id.clone()],
                });
            }
        }

        groups
    }
}

impl Default for SenderGrouper {
    fn default() -> Self {
        Self::new()
    }
}
