pub mod anilist;
pub mod db;
pub mod gateway;
pub mod mangadex;

pub use anilist::AniListAdapter;
pub use db::DbAdapter;
pub use gateway::RateLimitedGateway;
pub use mangadex::MangaDexAdapter;
