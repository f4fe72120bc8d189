pub mod control;
pub mod engine;
pub mod message;
pub mod registry;
pub mod resolver;
pub mod subscription;
pub mod topic;
pub mod wildcard;

pub use control::{ControlChannels, ControlKind};
pub use engine::Broker;
pub use message::{BroadcastMessage, Message, RoutingOptions};
pub use registry::{Snapshot, SubscriptionRegistry};
pub use resolver::{HandlerResolver, HandlerType, ServiceRegistry, TopicHandler};
pub use subscription::{RouteKind, Subscription, SubscriptionHandle, SubscriptionId};
pub use topic::Topic;
