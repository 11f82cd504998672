mod commit;
mod episodes;
mod feeds;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    CommitReport, DatabaseError, Episode, EpisodeEdit, EpisodeFilter, Feed, FeedEdit,
};
