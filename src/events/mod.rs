//! Typed live-room events.
//!
//! Every known `WrappedMessage.method` maps to one [`Method`] variant, and
//! [`LiveEvent::decode`] turns the matching payload into an immutable value.

mod handler;

pub use handler::{Flow, LikeWindow, MessageHandler, ViewerSampler};

use prost::Message;
use serde::Serialize;

use crate::protocol::ProtocolError;
use crate::protocol::messages::{
    ChatMessage, ControlMessage, EmojiChatMessage, FansclubMessage, GiftMessage, LikeMessage,
    MemberMessage, RoomMessage, RoomRankMessage, RoomStatsMessage, RoomUserSeqMessage,
    SocialMessage, User,
};

/// Control status signalling that the broadcast is over.
pub const STATUS_STREAM_ENDED: i32 = 3;

/// Event types the dispatcher knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Chat,
    Gift,
    Like,
    Member,
    Social,
    RoomUserSeq,
    Fansclub,
    Control,
    EmojiChat,
    RoomStats,
    Room,
    RoomRank,
}

impl Method {
    pub const ALL: [Method; 12] = [
        Method::Chat,
        Method::Gift,
        Method::Like,
        Method::Member,
        Method::Social,
        Method::RoomUserSeq,
        Method::Fansclub,
        Method::Control,
        Method::EmojiChat,
        Method::RoomStats,
        Method::Room,
        Method::RoomRank,
    ];

    /// Looks up a wire method name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "WebcastChatMessage" => Self::Chat,
            "WebcastGiftMessage" => Self::Gift,
            "WebcastLikeMessage" => Self::Like,
            "WebcastMemberMessage" => Self::Member,
            "WebcastSocialMessage" => Self::Social,
            "WebcastRoomUserSeqMessage" => Self::RoomUserSeq,
            "WebcastFansclubMessage" => Self::Fansclub,
            "WebcastControlMessage" => Self::Control,
            "WebcastEmojiChatMessage" => Self::EmojiChat,
            "WebcastRoomStatsMessage" => Self::RoomStats,
            "WebcastRoomMessage" => Self::Room,
            "WebcastRoomRankMessage" => Self::RoomRank,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Chat => "WebcastChatMessage",
            Self::Gift => "WebcastGiftMessage",
            Self::Like => "WebcastLikeMessage",
            Self::Member => "WebcastMemberMessage",
            Self::Social => "WebcastSocialMessage",
            Self::RoomUserSeq => "WebcastRoomUserSeqMessage",
            Self::Fansclub => "WebcastFansclubMessage",
            Self::Control => "WebcastControlMessage",
            Self::EmojiChat => "WebcastEmojiChatMessage",
            Self::RoomStats => "WebcastRoomStatsMessage",
            Self::Room => "WebcastRoomMessage",
            Self::RoomRank => "WebcastRoomRankMessage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

/// The user an event originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: u64,
    pub nick_name: String,
    pub gender: Option<Gender>,
}

impl From<User> for UserRef {
    fn from(user: User) -> Self {
        let gender = match user.gender {
            0 => Some(Gender::Female),
            1 => Some(Gender::Male),
            _ => None,
        };
        Self {
            id: user.id,
            nick_name: user.nick_name,
            gender,
        }
    }
}

fn user_ref(user: Option<User>) -> UserRef {
    user.map(UserRef::from).unwrap_or(UserRef {
        id: 0,
        nick_name: String::new(),
        gender: None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub user: UserRef,
    pub score: String,
}

/// A decoded live-room event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Chat {
        user: UserRef,
        content: String,
    },
    Gift {
        user: UserRef,
        gift_name: String,
        combo_count: u64,
    },
    Like {
        user: UserRef,
        count: u64,
    },
    Member {
        user: UserRef,
    },
    Social {
        user: UserRef,
    },
    RoomUserSeq {
        current: i64,
        total: String,
    },
    Fansclub {
        content: String,
    },
    Control {
        status: i32,
    },
    EmojiChat {
        user: UserRef,
        emoji_id: i64,
        default_content: String,
    },
    RoomStats {
        display_long: String,
    },
    Room {
        room_id: u64,
    },
    RoomRank {
        ranks: Vec<RankEntry>,
    },
}

impl LiveEvent {
    /// Decodes the payload of a message whose method resolved to `method`.
    pub fn decode(method: Method, payload: &[u8]) -> Result<Self, ProtocolError> {
        let wrap = |source| ProtocolError::PayloadDecode {
            method: method.name().to_string(),
            source,
        };

        let event = match method {
            Method::Chat => {
                let msg = ChatMessage::decode(payload).map_err(wrap)?;
                Self::Chat {
                    user: user_ref(msg.user),
                    content: msg.content,
                }
            }
            Method::Gift => {
                let msg = GiftMessage::decode(payload).map_err(wrap)?;
                Self::Gift {
                    user: user_ref(msg.user),
                    gift_name: msg.gift.map(|g| g.name).unwrap_or_default(),
                    combo_count: msg.combo_count,
                }
            }
            Method::Like => {
                let msg = LikeMessage::decode(payload).map_err(wrap)?;
                Self::Like {
                    user: user_ref(msg.user),
                    count: msg.count,
                }
            }
            Method::Member => {
                let msg = MemberMessage::decode(payload).map_err(wrap)?;
                Self::Member {
                    user: user_ref(msg.user),
                }
            }
            Method::Social => {
                let msg = SocialMessage::decode(payload).map_err(wrap)?;
                Self::Social {
                    user: user_ref(msg.user),
                }
            }
            Method::RoomUserSeq => {
                let msg = RoomUserSeqMessage::decode(payload).map_err(wrap)?;
                Self::RoomUserSeq {
                    current: msg.total,
                    total: msg.total_pv_for_anchor,
                }
            }
            Method::Fansclub => {
                let msg = FansclubMessage::decode(payload).map_err(wrap)?;
                Self::Fansclub {
                    content: msg.content,
                }
            }
            Method::Control => {
                let msg = ControlMessage::decode(payload).map_err(wrap)?;
                Self::Control { status: msg.status }
            }
            Method::EmojiChat => {
                let msg = EmojiChatMessage::decode(payload).map_err(wrap)?;
                Self::EmojiChat {
                    user: user_ref(msg.user),
                    emoji_id: msg.emoji_id,
                    default_content: msg.default_content,
                }
            }
            Method::RoomStats => {
                let msg = RoomStatsMessage::decode(payload).map_err(wrap)?;
                Self::RoomStats {
                    display_long: msg.display_long,
                }
            }
            Method::Room => {
                let msg = RoomMessage::decode(payload).map_err(wrap)?;
                Self::Room {
                    room_id: msg.common.map(|c| c.room_id).unwrap_or_default(),
                }
            }
            Method::RoomRank => {
                let msg = RoomRankMessage::decode(payload).map_err(wrap)?;
                Self::RoomRank {
                    ranks: msg
                        .ranks_list
                        .into_iter()
                        .map(|rank| RankEntry {
                            user: user_ref(rank.user),
                            score: rank.score_str,
                        })
                        .collect(),
                }
            }
        };
        Ok(event)
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Chat { .. } => Method::Chat,
            Self::Gift { .. } => Method::Gift,
            Self::Like { .. } => Method::Like,
            Self::Member { .. } => Method::Member,
            Self::Social { .. } => Method::Social,
            Self::RoomUserSeq { .. } => Method::RoomUserSeq,
            Self::Fansclub { .. } => Method::Fansclub,
            Self::Control { .. } => Method::Control,
            Self::EmojiChat { .. } => Method::EmojiChat,
            Self::RoomStats { .. } => Method::RoomStats,
            Self::Room { .. } => Method::Room,
            Self::RoomRank { .. } => Method::RoomRank,
        }
    }
}
