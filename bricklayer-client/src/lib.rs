mod admin;
pub use admin::{list_users, toggle_admin, toggle_blocked};

mod comment_tree;
pub use comment_tree::{build_tree, count_nodes, walk_forest, CommentNode, Threaded, Walk};

mod db;
pub use db::Db;

mod error;
pub use error::Error;

pub mod rest;
pub use rest::RestDb;

mod thread;
pub use thread::Thread;

mod vote;
pub use vote::{apply_vote, cast_vote, LocalVote, PendingVote, VoteTarget, VoteTransition};

pub mod api {
    pub use bricklayer_api::*;
}
