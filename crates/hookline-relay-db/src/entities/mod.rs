//! Database entities

pub mod endpoint;
pub mod endpoint_settings;
pub mod forward_attempt;
pub mod forwarding_rule;
pub mod replay;
pub mod request;
pub mod retention_policy;
pub mod transformation;

pub use endpoint::Entity as Endpoint;
pub use endpoint_settings::Entity as EndpointSettings;
pub use forward_attempt::Entity as ForwardAttempt;
pub use forwarding_rule::Entity as ForwardingRule;
pub use replay::Entity as Replay;
pub use request::Entity as Request;
pub use retention_policy::Entity as RetentionPolicy;
pub use transformation::Entity as Transformation;

pub mod prelude {
    pub use super::endpoint::Entity as Endpoint;
    pub use super::endpoint_settings::Entity as EndpointSettings;
    pub use super::forward_attempt::Entity as ForwardAttempt;
    pub use super::forwarding_rule::Entity as ForwardingRule;
    pub use super::replay::Entity as Replay;
    pub use super::request::Entity as Request;
    pub use super::retention_policy::Entity as RetentionPolicy;
    pub use super::transformation::Entity as Transformation;
}
