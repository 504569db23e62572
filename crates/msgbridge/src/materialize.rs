//! Native to wire message conversion, with recall substitution.

use std::sync::Arc;

use msgbridge_protocol::{Segment, WireMessage, WireSender, render_raw};

use crate::error::BridgeResult;
use crate::native::{ChatType, NativeElement, NativeKey, NativeMessage, RecallSnapshots};
use crate::registry::IdRegistry;

/// Converts native messages into wire messages.
///
/// A recalled message is rendered from its pre-recall snapshot when one is
/// available, otherwise from the recalled stub as-is.
pub struct Materializer {
    registry: Arc<IdRegistry>,
    recall: Arc<dyn RecallSnapshots>,
}

impl Materializer {
    pub fn new(registry: Arc<IdRegistry>, recall: Arc<dyn RecallSnapshots>) -> Self {
        Self { registry, recall }
    }

    pub fn registry(&self) -> &Arc<IdRegistry> {
        &self.registry
    }

    /// `Ok(None)` when the message has no renderable content.
    ///
    /// A wire id is allocated for the message (and for any message it
    /// replies to) only when something is rendered.
    pub async fn materialize(&self, raw: &NativeMessage) -> BridgeResult<Option<WireMessage>> {
        if !raw.is_recalled() {
            return self.convert(raw, raw);
        }

        match self.recall.pre_recall_snapshot(&raw.key()).await {
            Some(snapshot) => {
                tracing::debug!(
                    "substituting pre-recall snapshot for {} (seq {})",
                    raw.key(),
                    raw.msg_seq
                );
                self.convert(raw, &snapshot)
            }
            None => {
                tracing::warn!(
                    "no pre-recall snapshot for {} (seq {}), rendering recalled stub",
                    raw.key(),
                    raw.msg_seq
                );
                self.convert(raw, raw)
            }
        }
    }

    /// Identity and position come from `raw`; content comes from `content`.
    fn convert(
        &self,
        raw: &NativeMessage,
        content: &NativeMessage,
    ) -> BridgeResult<Option<WireMessage>> {
        if !content.elements.iter().any(is_renderable) {
            return Ok(None);
        }

        let mut segments = Vec::with_capacity(content.elements.len());
        for element in &content.elements {
            if let Some(segment) = self.segment(raw, element)? {
                segments.push(segment);
            }
        }

        let message_id = self.registry.allocate(&raw.key())?;
        let group_id = (raw.peer.chat_type == ChatType::Group).then(|| raw.peer.peer_id.clone());
        let raw_message = render_raw(&segments);

        Ok(Some(WireMessage {
            message_id,
            message_seq: raw.msg_seq,
            message_type: raw.peer.chat_type.message_type(),
            group_id,
            user_id: content.sender_id.clone(),
            time: raw.time,
            sender: WireSender {
                user_id: content.sender_id.clone(),
                nickname: content.sender_name.clone(),
                card: content.sender_card.clone().filter(|card| !card.is_empty()),
            },
            message: segments,
            raw_message,
        }))
    }

    fn segment(
        &self,
        raw: &NativeMessage,
        element: &NativeElement,
    ) -> BridgeResult<Option<Segment>> {
        let segment = match element {
            NativeElement::Text { content } if is_blank(content) => None,
            NativeElement::Text { content } => Some(Segment::text(content.clone())),
            NativeElement::Face { face_id } => Some(Segment::Face {
                id: face_id.to_string(),
            }),
            NativeElement::Image { file_name, url } => Some(Segment::Image {
                file: file_name.clone(),
                url: url.clone(),
            }),
            NativeElement::Mention { uid } => Some(Segment::At { qq: uid.clone() }),
            NativeElement::Reply { source_msg_id } => {
                let target = NativeKey::new(raw.peer.clone(), source_msg_id.clone());
                Some(Segment::Reply {
                    id: self.registry.allocate(&target)?,
                })
            }
            NativeElement::MultiForward { res_id } => Some(Segment::Forward { id: res_id.clone() }),
            NativeElement::GrayTip { .. } => None,
        };
        Ok(segment)
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Elements that count as content on their own. A bare reply or a gray tip
/// does not.
fn is_renderable(element: &NativeElement) -> bool {
    match element {
        NativeElement::Text { content } => !is_blank(content),
        NativeElement::Face { .. }
        | NativeElement::Image { .. }
        | NativeElement::Mention { .. }
        | NativeElement::MultiForward { .. } => true,
        NativeElement::Reply { .. } | NativeElement::GrayTip { .. } => false,
    }
}
