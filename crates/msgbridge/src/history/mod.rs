//! Paginated history fetcher.
//!
//! Drives repeated seq-anchored calls into the chat source until the
//! requested number of renderable messages has been collected or the source
//! returns an empty page.
//!
//! Anchors are exclusive: a request anchored at seq `n` never returns `n`
//! itself, and each following page is anchored one past the edge of the
//! previous one. This assumes the native seq space is dense per peer.

use std::collections::VecDeque;
use std::sync::Arc;

use msgbridge_protocol::WireMessage;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::materialize::Materializer;
use crate::native::{ChatSource, NativeMessage, Peer};

/// History fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Upper bound on messages requested from the source in one call.
    pub page_size: usize,
    /// Largest count a single request may ask for.
    pub max_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_count: 500,
        }
    }
}

/// Which way to walk from the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Older,
    Newer,
}

impl Direction {
    /// The first seq past `seq` in this direction, if one can exist.
    pub fn step(self, seq: u64) -> Option<u64> {
        match self {
            Self::Older => seq.checked_sub(1),
            Self::Newer => seq.checked_add(1),
        }
    }

    fn in_bound(self, seq: u64, cursor: u64) -> bool {
        match self {
            Self::Older => seq <= cursor,
            Self::Newer => seq >= cursor,
        }
    }
}

/// How a fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchOutcome {
    /// The requested count was reached.
    Satisfied,
    /// The source ran out of messages first.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub peer: Peer,
    pub count: usize,
    pub direction: Direction,
    /// `None` starts from the freshest window and then walks older,
    /// whatever `direction` says.
    pub anchor_seq: Option<u64>,
}

/// Result of a fetch, always ordered by ascending seq.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<WireMessage>,
    pub outcome: FetchOutcome,
}

enum Cursor {
    Latest,
    Seq(u64),
    /// No seq exists past the last edge.
    End,
}

pub struct HistoryFetcher {
    source: Arc<dyn ChatSource>,
    materializer: Arc<Materializer>,
    config: HistoryConfig,
}

impl HistoryFetcher {
    pub fn new(
        source: Arc<dyn ChatSource>,
        materializer: Arc<Materializer>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            source,
            materializer,
            config,
        }
    }

    pub async fn fetch(&self, request: &HistoryRequest) -> BridgeResult<HistoryPage> {
        if request.count == 0 {
            return Err(BridgeError::InvalidRequest(
                "history count must be positive".to_string(),
            ));
        }
        if request.count > self.config.max_count {
            return Err(BridgeError::InvalidRequest(format!(
                "history count {} exceeds the limit of {}",
                request.count, self.config.max_count
            )));
        }
        let mut remaining = request.count;

        let peer = &request.peer;
        // The freshest window is the newest end of the history, so anything
        // still missing after it can only come from older messages.
        let (direction, mut cursor) = match request.anchor_seq {
            None => (Direction::Older, Cursor::Latest),
            Some(anchor) => (
                request.direction,
                request.direction.step(anchor).map_or(Cursor::End, Cursor::Seq),
            ),
        };
        let mut collected: VecDeque<WireMessage> = VecDeque::new();

        loop {
            let (mut raw, bound) = match cursor {
                Cursor::Latest => (self.latest(peer, remaining).await?, None),
                Cursor::Seq(seq) => {
                    let page_len = remaining.min(self.config.page_size.max(1));
                    (self.page(peer, seq, page_len, direction).await?, Some(seq))
                }
                Cursor::End => return Ok(finish(collected, FetchOutcome::Exhausted)),
            };
            if raw.is_empty() {
                return Ok(finish(collected, FetchOutcome::Exhausted));
            }

            raw.sort_by_key(|msg| msg.msg_seq);
            cursor = next_cursor(direction, &raw, bound);
            let fetched = raw.len();
            if let Some(bound) = bound {
                raw.retain(|msg| direction.in_bound(msg.msg_seq, bound));
            }

            let mut page = Vec::with_capacity(raw.len());
            for msg in &raw {
                if let Some(wire) = self.materializer.materialize(msg).await? {
                    page.push(wire);
                }
            }

            if page.len() > remaining {
                let excess = page.len() - remaining;
                // Keep what sits closest to the anchor (or to "now").
                if direction == Direction::Older {
                    page.drain(..excess);
                } else {
                    page.truncate(remaining);
                }
            }
            remaining -= page.len();

            tracing::debug!(
                "history page for {} at {:?}: fetched {}, kept {}, remaining {}",
                peer,
                bound,
                fetched,
                page.len(),
                remaining
            );

            match direction {
                Direction::Older => {
                    for wire in page.into_iter().rev() {
                        collected.push_front(wire);
                    }
                }
                Direction::Newer => collected.extend(page),
            }

            if remaining == 0 {
                return Ok(finish(collected, FetchOutcome::Satisfied));
            }
        }
    }

    async fn latest(&self, peer: &Peer, count: usize) -> BridgeResult<Vec<NativeMessage>> {
        self.source
            .latest_window(peer, count)
            .await
            .map_err(|e| source_failure(peer, None, e))
    }

    async fn page(
        &self,
        peer: &Peer,
        seq: u64,
        count: usize,
        direction: Direction,
    ) -> BridgeResult<Vec<NativeMessage>> {
        let old_to_new = direction != Direction::Newer;
        self.source
            .page_by_seq(peer, seq, count, old_to_new, true)
            .await
            .map_err(|e| source_failure(peer, Some(seq), e))
    }
}

fn source_failure(peer: &Peer, seq: Option<u64>, err: crate::native::SourceError) -> BridgeError {
    tracing::warn!("chat source failed for {} at {:?}: {}", peer, seq, err);
    BridgeError::source_unavailable(peer, seq, err)
}

/// Anchor for the page after `raw` (sorted ascending, non-empty).
///
/// The edge is taken from the raw page, empty materializations included, and
/// never lands back on the current anchor.
fn next_cursor(direction: Direction, raw: &[NativeMessage], bound: Option<u64>) -> Cursor {
    let edge = match direction {
        Direction::Older => raw[0].msg_seq.min(bound.unwrap_or(u64::MAX)),
        Direction::Newer => raw[raw.len() - 1].msg_seq.max(bound.unwrap_or(0)),
    };
    direction.step(edge).map_or(Cursor::End, Cursor::Seq)
}

fn finish(collected: VecDeque<WireMessage>, outcome: FetchOutcome) -> HistoryPage {
    HistoryPage {
        messages: collected.into(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::native::fixture::FixtureSource;
    use crate::native::{NativeElement, SourceError, SourceResult};
    use crate::recall::RecallCache;
    use crate::registry::IdRegistry;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Latest { count: usize },
        Page { seq: u64, old_to_new: bool, include_anchor: bool },
    }

    /// Returns queued pages in order and records every call.
    struct ScriptedSource {
        pages: Mutex<VecDeque<SourceResult<Vec<NativeMessage>>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedSource {
        fn with_pages(pages: Vec<SourceResult<Vec<NativeMessage>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn next(&self) -> SourceResult<Vec<NativeMessage>> {
            self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatSource for ScriptedSource {
        async fn latest_window(
            &self,
            _peer: &Peer,
            count: usize,
        ) -> SourceResult<Vec<NativeMessage>> {
            self.calls.lock().unwrap().push(Call::Latest { count });
            self.next()
        }

        async fn page_by_seq(
            &self,
            _peer: &Peer,
            seq: u64,
            _count: usize,
            old_to_new: bool,
            include_anchor: bool,
        ) -> SourceResult<Vec<NativeMessage>> {
            self.calls.lock().unwrap().push(Call::Page {
                seq,
                old_to_new,
                include_anchor,
            });
            self.next()
        }

        async fn message_by_id(
            &self,
            _peer: &Peer,
            _msg_id: &str,
        ) -> SourceResult<Option<NativeMessage>> {
            Ok(None)
        }
    }

    fn peer() -> Peer {
        Peer::group("5001")
    }

    fn msg(seq: u64) -> NativeMessage {
        NativeMessage {
            msg_id: format!("{}", 7_300_000_000_000_000_000u64 + seq),
            msg_seq: seq,
            peer: peer(),
            msg_type: 2,
            sender_id: "10001".to_string(),
            sender_name: "alice".to_string(),
            sender_card: None,
            time: 1_700_000_000 + seq as i64,
            recalled_at: None,
            elements: vec![NativeElement::Text {
                content: format!("m{seq}"),
            }],
        }
    }

    fn notice(seq: u64) -> NativeMessage {
        let mut m = msg(seq);
        m.elements = vec![NativeElement::GrayTip {
            text: "bob joined".to_string(),
        }];
        m
    }

    fn new_fetcher(source: Arc<dyn ChatSource>, config: HistoryConfig) -> HistoryFetcher {
        let materializer = Materializer::new(
            Arc::new(IdRegistry::new()),
            Arc::new(RecallCache::new(16)),
        );
        HistoryFetcher::new(source, Arc::new(materializer), config)
    }

    fn request(count: usize, direction: Direction, anchor_seq: Option<u64>) -> HistoryRequest {
        HistoryRequest {
            peer: peer(),
            count,
            direction,
            anchor_seq,
        }
    }

    fn seqs(page: &HistoryPage) -> Vec<u64> {
        page.messages.iter().map(|m| m.message_seq).collect()
    }

    fn dense_fixture(last: u64) -> Arc<FixtureSource> {
        Arc::new(FixtureSource::from_messages((1..=last).map(msg).collect()))
    }

    #[tokio::test]
    async fn test_anchor_is_excluded_older() {
        let source = ScriptedSource::with_pages(vec![]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        let page = fetcher
            .fetch(&request(10, Direction::Older, Some(100)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert_eq!(
            source.calls(),
            vec![Call::Page {
                seq: 99,
                old_to_new: true,
                include_anchor: true
            }]
        );
    }

    #[tokio::test]
    async fn test_anchor_is_excluded_newer() {
        let source = ScriptedSource::with_pages(vec![]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        fetcher
            .fetch(&request(10, Direction::Newer, Some(100)))
            .await
            .unwrap();
        assert_eq!(
            source.calls(),
            vec![Call::Page {
                seq: 101,
                old_to_new: false,
                include_anchor: true
            }]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_partial_result() {
        let source = ScriptedSource::with_pages(vec![Ok((80..100).map(msg).collect()), Ok(vec![])]);
        let config = HistoryConfig {
            page_size: 50,
            max_count: 500,
        };
        let fetcher = new_fetcher(source.clone(), config);

        let page = fetcher
            .fetch(&request(50, Direction::Older, Some(100)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert_eq!(seqs(&page), (80..100).collect::<Vec<_>>());

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[1], Call::Page { seq: 79, .. }));
    }

    #[tokio::test]
    async fn test_older_pages_are_prepended_without_gaps() {
        let fetcher = new_fetcher(
            dense_fixture(50),
            HistoryConfig {
                page_size: 7,
                max_count: 500,
            },
        );

        let page = fetcher
            .fetch(&request(25, Direction::Older, Some(40)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Satisfied);
        assert_eq!(seqs(&page), (15..=39).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_newer_pages_are_appended_until_exhausted() {
        let fetcher = new_fetcher(
            dense_fixture(50),
            HistoryConfig {
                page_size: 7,
                max_count: 500,
            },
        );

        let page = fetcher
            .fetch(&request(100, Direction::Newer, Some(10)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert_eq!(seqs(&page), (11..=50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_no_anchor_starts_from_latest_window() {
        let source = dense_fixture(50);
        let fetcher = new_fetcher(source, HistoryConfig::default());

        let page = fetcher
            .fetch(&request(5, Direction::Older, None))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Satisfied);
        assert_eq!(seqs(&page), vec![46, 47, 48, 49, 50]);
    }

    #[tokio::test]
    async fn test_empty_materializations_do_not_count() {
        let messages = (1..=30)
            .map(|seq| if seq % 3 == 0 { notice(seq) } else { msg(seq) })
            .collect();
        let fetcher = new_fetcher(
            Arc::new(FixtureSource::from_messages(messages)),
            HistoryConfig {
                page_size: 10,
                max_count: 500,
            },
        );

        let page = fetcher
            .fetch(&request(10, Direction::Older, None))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Satisfied);
        assert_eq!(
            seqs(&page),
            vec![16, 17, 19, 20, 22, 23, 25, 26, 28, 29]
        );
    }

    #[tokio::test]
    async fn test_seq_zero_is_a_real_anchor() {
        let source = ScriptedSource::with_pages(vec![]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        let page = fetcher
            .fetch(&request(10, Direction::Older, Some(0)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert!(page.messages.is_empty());
        assert!(source.calls().is_empty());

        fetcher
            .fetch(&request(10, Direction::Newer, Some(0)))
            .await
            .unwrap();
        assert!(matches!(source.calls()[0], Call::Page { seq: 1, .. }));
    }

    #[tokio::test]
    async fn test_older_stops_at_seq_zero() {
        let source = ScriptedSource::with_pages(vec![Ok(vec![msg(0), msg(1), msg(2)])]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        let page = fetcher
            .fetch(&request(10, Direction::Older, Some(3)))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert_eq!(seqs(&page), vec![0, 1, 2]);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_bound_messages_are_dropped() {
        // The source ignores the anchor and hands back the anchor itself.
        let source = ScriptedSource::with_pages(vec![
            Ok(vec![msg(8), msg(9), msg(10), msg(11)]),
            Ok(vec![msg(6), msg(7)]),
        ]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        let page = fetcher
            .fetch(&request(5, Direction::Older, Some(10)))
            .await
            .unwrap();
        assert_eq!(seqs(&page), vec![6, 7, 8, 9]);
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
        assert!(matches!(source.calls()[1], Call::Page { seq: 7, .. }));
    }

    #[tokio::test]
    async fn test_oversized_page_is_trimmed_toward_anchor() {
        let source = ScriptedSource::with_pages(vec![Ok((1..=9).map(msg).collect())]);
        let fetcher = new_fetcher(source, HistoryConfig::default());
        let page = fetcher
            .fetch(&request(3, Direction::Older, Some(10)))
            .await
            .unwrap();
        assert_eq!(seqs(&page), vec![7, 8, 9]);
        assert_eq!(page.outcome, FetchOutcome::Satisfied);

        let source = ScriptedSource::with_pages(vec![Ok((11..=19).map(msg).collect())]);
        let fetcher = new_fetcher(source, HistoryConfig::default());
        let page = fetcher
            .fetch(&request(3, Direction::Newer, Some(10)))
            .await
            .unwrap();
        assert_eq!(seqs(&page), vec![11, 12, 13]);
    }

    #[tokio::test]
    async fn test_zero_count_is_rejected() {
        let fetcher = new_fetcher(dense_fixture(5), HistoryConfig::default());
        let err = fetcher
            .fetch(&request(0, Direction::Older, None))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_count_above_max_is_rejected() {
        let source = ScriptedSource::with_pages(vec![]);
        let fetcher = new_fetcher(
            source.clone(),
            HistoryConfig {
                page_size: 20,
                max_count: 8,
            },
        );
        let err = fetcher
            .fetch(&request(30, Direction::Older, None))
            .await
            .unwrap_err();
        match err {
            BridgeError::InvalidRequest(reason) => assert!(reason.contains("8"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(source.calls().is_empty());

        let page = fetcher
            .fetch(&request(8, Direction::Older, None))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_latest_window_is_not_capped_by_page_size() {
        let fetcher = new_fetcher(
            dense_fixture(100),
            HistoryConfig {
                page_size: 20,
                max_count: 500,
            },
        );

        for direction in [Direction::Newer, Direction::Older] {
            let page = fetcher.fetch(&request(50, direction, None)).await.unwrap();
            assert_eq!(page.outcome, FetchOutcome::Satisfied);
            assert_eq!(seqs(&page), (51..=100).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_short_latest_window_continues_older() {
        let source = ScriptedSource::with_pages(vec![
            Ok(vec![notice(48), msg(49), msg(50)]),
            Ok((40..=47).map(msg).collect()),
        ]);
        let fetcher = new_fetcher(source.clone(), HistoryConfig::default());

        let page = fetcher
            .fetch(&request(3, Direction::Newer, None))
            .await
            .unwrap();
        assert_eq!(page.outcome, FetchOutcome::Satisfied);
        assert_eq!(seqs(&page), vec![47, 49, 50]);
        assert_eq!(
            source.calls(),
            vec![
                Call::Latest { count: 3 },
                Call::Page {
                    seq: 47,
                    old_to_new: true,
                    include_anchor: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_source_failure_carries_context() {
        let source = ScriptedSource::with_pages(vec![Err(SourceError::new(-2, "kernel busy"))]);
        let fetcher = new_fetcher(source, HistoryConfig::default());

        let err = fetcher
            .fetch(&request(10, Direction::Newer, Some(41)))
            .await
            .unwrap_err();
        match err {
            BridgeError::SourceUnavailable { peer: p, seq, source } => {
                assert_eq!(p, peer());
                assert_eq!(seq, Some(42));
                assert_eq!(source.status, -2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
