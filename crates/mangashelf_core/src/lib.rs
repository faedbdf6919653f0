pub mod aggregation;
pub mod cache;
pub mod domain;
pub mod live_search;
pub mod ports;
pub mod progress;
pub mod rate_limit;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use aggregation::{degrade, AggregationService};
pub use cache::TtlCache;
pub use domain::{
    ChapterPages, ChapterRecord, ContentRecord, EnhancedRecommendation,
    EnhancedRecord, MangaStatistics, MetadataRecord, PublicationStatus, ReadingProgressEntry,
    Recommendation, Review, TitleMatch, User, UserCredentials,
};
pub use live_search::LiveSearch;
pub use ports::{
    ContentSource, MetadataSource, PortError, PortResult, ProgressStorage, StorageError,
    UserStore,
};
pub use progress::{InMemoryStorage, ReadingProgressTracker};
pub use rate_limit::TokenBucket;
pub use resolver::{MappingCache, TitleResolver};
