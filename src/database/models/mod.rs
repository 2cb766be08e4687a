pub mod chat;
pub mod subscription;

pub use chat::{Chat, ChatMessageRow, NewChatMessage};
pub use subscription::{SubscriptionChange, UserSubscription};
