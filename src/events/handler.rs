//! Per-event business logic: what gets forwarded where.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use crate::events::{LiveEvent, STATUS_STREAM_ENDED, UserRef};
use crate::sink::{ChatRecord, Forwarder};

/// Capacity of the recent-likers window.
pub const LIKE_WINDOW_CAPACITY: usize = 10;
/// Viewer counts at or below this are never forwarded.
pub const VIEWER_FORWARD_THRESHOLD: i64 = 5;
/// Chance that a qualifying viewer-count event is forwarded.
pub const VIEWER_FORWARD_PROBABILITY: f64 = 0.05;

/// What the session should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    StreamEnded,
}

/// Recently-liked user ids.
///
/// The set and the queue always hold the same ids. Once the queue reaches
/// capacity after an observation, its oldest id leaves both.
#[derive(Debug)]
pub struct LikeWindow {
    members: HashSet<u64>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl Default for LikeWindow {
    fn default() -> Self {
        Self::with_capacity(LIKE_WINDOW_CAPACITY)
    }
}

impl LikeWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a like from `user_id`; returns `true` when it should be forwarded.
    pub fn observe(&mut self, user_id: u64) -> bool {
        let fresh = self.members.insert(user_id);
        if fresh {
            self.order.push_back(user_id);
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        fresh
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.members.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }
}

/// Per-event sampling of viewer-count updates.
#[derive(Debug)]
pub struct ViewerSampler {
    rng: StdRng,
}

impl Default for ViewerSampler {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl ViewerSampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn should_forward(&mut self, current: i64) -> bool {
        current > VIEWER_FORWARD_THRESHOLD && self.rng.gen_bool(VIEWER_FORWARD_PROBABILITY)
    }
}

/// Applies forwarding rules to decoded events for one live room.
pub struct MessageHandler {
    live_id: String,
    source_tag: String,
    forwarder: Forwarder,
    likes: LikeWindow,
    sampler: ViewerSampler,
}

impl MessageHandler {
    pub fn new(
        live_id: impl Into<String>,
        source_tag: impl Into<String>,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            live_id: live_id.into(),
            source_tag: source_tag.into(),
            forwarder,
            likes: LikeWindow::default(),
            sampler: ViewerSampler::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: ViewerSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn likes(&self) -> &LikeWindow {
        &self.likes
    }

    /// Drops per-room state; called when the session terminates.
    pub fn reset(&mut self) {
        self.likes.clear();
    }

    pub fn handle(&mut self, event: &LiveEvent) -> Flow {
        match event {
            LiveEvent::Chat { user, content } => {
                info!(live_id = %self.live_id, "[chat] [{}]{}: {}", user.id, user.nick_name, content);
                self.forwarder.conversation(
                    Some(user.id),
                    format!(
                        "action:聊天msg,user_name:{},msg:留言：{}",
                        user.nick_name, content
                    ),
                );
                self.forwarder.storage(ChatRecord {
                    live_id: self.live_id.clone(),
                    user_id: user.id,
                    user_name: user.nick_name.clone(),
                    msg: content.clone(),
                    source: self.source_tag.clone(),
                });
            }
            LiveEvent::Gift {
                user,
                gift_name,
                combo_count,
            } => {
                info!(live_id = %self.live_id, "[gift] {} sent {}x{}", user.nick_name, gift_name, combo_count);
                self.forward_user(
                    user,
                    format!(
                        "action:礼物msg,user_name:{},msg:送出了：{}x{}",
                        user.nick_name, gift_name, combo_count
                    ),
                );
            }
            LiveEvent::Like { user, count } => {
                info!(live_id = %self.live_id, "[like] {} liked {} times", user.nick_name, count);
                if self.likes.observe(user.id) {
                    self.forward_user(
                        user,
                        format!(
                            "action:点赞msg,user_name:{},msg:点了{}个赞",
                            user.nick_name, count
                        ),
                    );
                }
            }
            LiveEvent::Member { user } => {
                info!(live_id = %self.live_id, "[member] {} entered", user.nick_name);
                self.forward_user(
                    user,
                    format!(
                        "action:进入直播间msg,user_name:{},msg:进了直播间",
                        user.nick_name
                    ),
                );
            }
            LiveEvent::Social { user } => {
                info!(live_id = %self.live_id, "[follow] [{}]{} followed", user.id, user.nick_name);
                self.forward_user(
                    user,
                    format!("action:关注msg,user_name:{},msg:关注了主播", user.nick_name),
                );
            }
            LiveEvent::RoomUserSeq { current, total } => {
                info!(live_id = %self.live_id, "[viewers] current {}, total {}", current, total);
                if self.sampler.should_forward(*current) {
                    self.forwarder
                        .conversation(None, format!("action:统计msg,msg:当前直播间有{}人", current));
                }
            }
            LiveEvent::Fansclub { content } => {
                info!(live_id = %self.live_id, "[fansclub] {}", content);
            }
            LiveEvent::EmojiChat {
                user,
                emoji_id,
                default_content,
            } => {
                info!(live_id = %self.live_id, "[emoji] {} sent #{} {}", user.nick_name, emoji_id, default_content);
            }
            LiveEvent::RoomStats { display_long } => {
                info!(live_id = %self.live_id, "[stats] {}", display_long);
            }
            LiveEvent::Room { room_id } => {
                info!(live_id = %self.live_id, "[room] room id {}", room_id);
            }
            LiveEvent::RoomRank { ranks } => {
                debug!(live_id = %self.live_id, "[rank] {} entries", ranks.len());
            }
            LiveEvent::Control { status } => {
                if *status == STATUS_STREAM_ENDED {
                    info!(live_id = %self.live_id, "live stream ended");
                    return Flow::StreamEnded;
                }
                debug!(live_id = %self.live_id, status, "room status changed");
            }
        }
        Flow::Continue
    }

    fn forward_user(&self, user: &UserRef, query: String) {
        self.forwarder.conversation(Some(user.id), query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Gender;
    use crate::testing::recording_forwarder;

    fn user(id: u64) -> UserRef {
        UserRef {
            id,
            nick_name: format!("user{id}"),
            gender: Some(Gender::Male),
        }
    }

    fn like(id: u64) -> LiveEvent {
        LiveEvent::Like {
            user: user(id),
            count: 1,
        }
    }

    #[test]
    fn test_like_window_evicts_oldest_at_capacity() {
        let mut window = LikeWindow::default();
        assert!(window.observe(1));
        assert!(!window.observe(1));
        for id in 2..=9 {
            assert!(window.observe(id));
        }
        assert!(window.contains(1));
        assert!(window.observe(10));
        assert!(!window.contains(1));
        assert_eq!(window.len(), LIKE_WINDOW_CAPACITY - 1);
        assert!(window.observe(1));
    }

    #[test]
    fn test_like_window_duplicate_is_not_reinserted() {
        let mut window = LikeWindow::with_capacity(3);
        assert!(window.observe(1));
        assert!(window.observe(2));
        assert!(window.observe(3));
        assert!(!window.contains(1));
        assert_eq!(window.len(), 2);
        assert!(!window.observe(3));
        assert_eq!(window.len(), 2);
        assert!(window.contains(2));
    }

    #[tokio::test]
    async fn test_likes_forwarded_once_per_window() {
        let (forwarder, conversation, _storage) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);

        // A, A, B..K: eleven distinct ids against a window of ten.
        let mut ids = vec![1, 1];
        ids.extend(2..=11);
        for id in &ids {
            assert_eq!(handler.handle(&like(*id)), Flow::Continue);
        }
        handler.forwarder().idle().await;

        let forwarded: Vec<Option<u64>> =
            conversation.requests().iter().map(|r| r.user_id).collect();
        assert_eq!(forwarded.len(), 11);
        assert_eq!(forwarded.iter().filter(|id| **id == Some(1)).count(), 1);
        assert!(!handler.likes().contains(1));

        handler.handle(&like(1));
        handler.forwarder().idle().await;
        assert_eq!(conversation.requests().len(), 12);
    }

    #[tokio::test]
    async fn test_chat_goes_to_both_sinks() {
        let (forwarder, conversation, storage) = recording_forwarder();
        let mut handler = MessageHandler::new("261378947940", "douyin", forwarder);

        handler.handle(&LiveEvent::Chat {
            user: user(5),
            content: "hello".into(),
        });
        handler.forwarder().idle().await;

        let requests = conversation.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_id, Some(5));
        assert_eq!(requests[0].query, "action:聊天msg,user_name:user5,msg:留言：hello");

        let records = storage.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].live_id, "261378947940");
        assert_eq!(records[0].msg, "hello");
        assert_eq!(records[0].source, "douyin");
    }

    #[tokio::test]
    async fn test_gift_goes_to_conversation_only() {
        let (forwarder, conversation, storage) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);

        handler.handle(&LiveEvent::Gift {
            user: user(3),
            gift_name: "Rose".into(),
            combo_count: 4,
        });
        handler.forwarder().idle().await;

        assert_eq!(
            conversation.requests()[0].query,
            "action:礼物msg,user_name:user3,msg:送出了：Rosex4"
        );
        assert!(storage.records().is_empty());
    }

    #[tokio::test]
    async fn test_member_entry_is_forwarded_unconditionally() {
        let (forwarder, conversation, storage) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);

        for _ in 0..2 {
            handler.handle(&LiveEvent::Member { user: user(8) });
        }
        handler.forwarder().idle().await;

        let requests = conversation.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.user_id, Some(8));
            assert_eq!(request.query, "action:进入直播间msg,user_name:user8,msg:进了直播间");
        }
        assert!(storage.records().is_empty());
    }

    #[tokio::test]
    async fn test_follow_is_forwarded_to_conversation_only() {
        let (forwarder, conversation, storage) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);

        handler.handle(&LiveEvent::Social { user: user(9) });
        handler.forwarder().idle().await;

        let requests = conversation.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_id, Some(9));
        assert_eq!(requests[0].query, "action:关注msg,user_name:user9,msg:关注了主播");
        assert!(storage.records().is_empty());
    }

    #[tokio::test]
    async fn test_informational_events_are_not_forwarded() {
        let (forwarder, conversation, storage) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);

        let events = [
            LiveEvent::Fansclub {
                content: "joined".into(),
            },
            LiveEvent::RoomStats {
                display_long: "1万".into(),
            },
            LiveEvent::Room { room_id: 9 },
            LiveEvent::RoomRank { ranks: vec![] },
            LiveEvent::EmojiChat {
                user: user(1),
                emoji_id: 2,
                default_content: "[smile]".into(),
            },
            LiveEvent::Control { status: 1 },
        ];
        for event in &events {
            assert_eq!(handler.handle(event), Flow::Continue);
        }
        handler.forwarder().idle().await;

        assert!(conversation.requests().is_empty());
        assert!(storage.records().is_empty());
    }

    #[test]
    fn test_stream_end_status_stops_session() {
        let (forwarder, _, _) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);
        assert_eq!(
            handler.handle(&LiveEvent::Control {
                status: STATUS_STREAM_ENDED
            }),
            Flow::StreamEnded
        );
    }

    #[test]
    fn test_sampler_never_forwards_small_rooms() {
        let mut sampler = ViewerSampler::seeded(7);
        for current in [-1, 0, 1, 5] {
            for _ in 0..10_000 {
                assert!(!sampler.should_forward(current));
            }
        }
    }

    #[test]
    fn test_sampler_rate_matches_probability() {
        let mut sampler = ViewerSampler::seeded(20_240_102);
        let trials = 100_000;
        let hits = (0..trials).filter(|_| sampler.should_forward(6)).count();
        let rate = hits as f64 / trials as f64;
        // Five standard deviations of a binomial(100000, 0.05) is about 0.0035.
        assert!((rate - VIEWER_FORWARD_PROBABILITY).abs() < 0.0035, "rate {rate}");
    }

    #[tokio::test]
    async fn test_viewer_count_forwards_without_user() {
        let (forwarder, conversation, _) = recording_forwarder();
        let mut handler =
            MessageHandler::new("1", "douyin", forwarder).with_sampler(ViewerSampler::seeded(1));

        for _ in 0..2_000 {
            handler.handle(&LiveEvent::RoomUserSeq {
                current: 120,
                total: "3.4万".into(),
            });
        }
        handler.forwarder().idle().await;

        let requests = conversation.requests();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| r.user_id.is_none()));
        assert_eq!(requests[0].query, "action:统计msg,msg:当前直播间有120人");
    }

    #[tokio::test]
    async fn test_reset_clears_like_window() {
        let (forwarder, _, _) = recording_forwarder();
        let mut handler = MessageHandler::new("1", "douyin", forwarder);
        handler.handle(&like(4));
        assert!(handler.likes().contains(4));
        handler.reset();
        assert!(handler.likes().is_empty());
    }
}
