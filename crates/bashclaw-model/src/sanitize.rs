// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Message sanitization: strip image content when the model does not support it.
//!
//! Call [`strip_images_if_unsupported`] before handing messages to a provider
//! adapter to ensure image blocks are replaced with a text placeholder
//! whenever the target model only supports text input.

use crate::types::{Block, Message};

const IMAGE_OMITTED: &str = "[image omitted: model does not support image input]";

/// Replace all [`Block::Image`] content in `messages` with a text placeholder
/// when `supports_images` is false.
///
/// If the model does support images this is a no-op and the messages are
/// returned unchanged.
pub fn strip_images_if_unsupported(messages: Vec<Message>, supports_images: bool) -> Vec<Message> {
    if supports_images {
        return messages;
    }
    messages.into_iter().map(strip_message).collect()
}

fn strip_message(mut m: Message) -> Message {
    m.content = m
        .content
        .into_iter()
        .map(|b| match b {
            Block::Image { .. } => Block::text(IMAGE_OMITTED),
            other => other,
        })
        .collect();
    m
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn no_op_when_image_supported() {
        let msg = Message::user("hello");
        let result = strip_images_if_unsupported(vec![msg], true);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn strips_image_block_to_text_placeholder() {
        let msg = Message {
            role: Role::User,
            content: vec![
                Block::text("describe this"),
                Block::Image {
                    source: "data:image/png;base64,ABC".into(),
                },
            ],
        };
        let result = strip_images_if_unsupported(vec![msg], false);
        assert_eq!(result[0].content.len(), 2);
        assert!(matches!(&result[0].content[1], Block::Text { text } if text == IMAGE_OMITTED));
    }

    #[test]
    fn strips_image_only_message_collapses_gracefully() {
        let msg = Message {
            role: Role::User,
            content: vec![Block::Image {
                source: "data:image/png;base64,ABC".into(),
            }],
        };
        let result = strip_images_if_unsupported(vec![msg], false);
        assert_eq!(result[0].text_summary(), IMAGE_OMITTED);
    }

    #[test]
    fn plain_text_messages_pass_through_unchanged() {
        let msgs = vec![Message::user("hello")];
        let result = strip_images_if_unsupported(msgs, false);
        assert_eq!(result[0].text_summary(), "hello");
    }
}
