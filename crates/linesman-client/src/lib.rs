pub mod catalog;
pub mod providers;
pub mod transport;

pub use catalog::{ProviderCatalog, ProviderEntry, ProviderKind};
pub use providers::{NbaCdnProvider, OddsFeed, OddsProvider, SportsFeedProvider};
pub use transport::ReqwestTransport;
