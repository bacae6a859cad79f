//! Platform publish adapters.
//!
//! One `PlatformPublisher` per destination, sharing the credential seam and
//! the transient-failure retry policy. Adapters are independent: one
//! platform failing never interrupts the other.

pub mod credentials;
pub mod error;
pub mod instagram;
pub mod publisher;
pub mod retry;
pub mod youtube;

pub use credentials::{
    CredentialSource, EnvCredentialSource, InstagramCredentials, YoutubeCredentials,
};
pub use error::{PublishError, PublishResult};
pub use instagram::{build_caption, InstagramConfig, InstagramPublisher};
pub use publisher::{PlatformPublisher, PublishRequest, PublishedMedia};
pub use retry::{with_retry, RetryConfig};
pub use youtube::{build_tags, YoutubeConfig, YoutubePublisher};
